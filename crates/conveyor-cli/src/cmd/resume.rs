use std::path::Path;

use clap::Args;
use conveyor_core::orchestrator::HumanDecision;

use crate::output;

#[derive(Args, Debug)]
pub struct ResumeArgs {
    pub thread_id: String,

    /// Accept and continue
    #[arg(long)]
    pub approve: bool,

    /// Refuse; aborts the run unless re-entry is configured
    #[arg(long, conflicts_with = "approve")]
    pub reject: bool,

    /// Reason recorded with a rejection
    #[arg(long, requires = "reject")]
    pub reason: Option<String>,

    /// Capability granted for the new checkpoint cycle (repeatable)
    #[arg(long = "grant", requires = "approve")]
    pub grants: Vec<String>,

    /// Adjust rigidity and re-run the suspended stage
    #[arg(long, conflicts_with_all = ["approve", "reject"])]
    pub rigidity: Option<f64>,

    /// Adjust the default iteration cap and re-run the suspended stage
    #[arg(long, conflicts_with_all = ["approve", "reject"])]
    pub max_iterations: Option<u32>,
}

pub fn run(root: &Path, args: ResumeArgs, json: bool) -> anyhow::Result<()> {
    let decision = if args.approve {
        HumanDecision::Approve {
            grants: args.grants,
        }
    } else if args.reject {
        HumanDecision::Reject {
            reason: args.reason,
        }
    } else if args.rigidity.is_some() || args.max_iterations.is_some() {
        HumanDecision::Modify {
            rigidity: args.rigidity,
            max_iterations: args.max_iterations,
        }
    } else {
        anyhow::bail!("specify --approve, --reject, or --rigidity/--max-iterations");
    };

    let config = super::load_config(root)?;
    let orch = super::build_orchestrator(root, &config)?;
    let run = orch.resume(&args.thread_id, decision)?;

    if json {
        output::print_json(&run.status())?;
    } else {
        output::print_status(&run.status());
    }
    Ok(())
}
