use conveyor_core::gateway::ToolGateway;

use crate::output;

pub fn run(json: bool) -> anyhow::Result<()> {
    let gateway = ToolGateway::builtin();

    if json {
        let capabilities: Vec<_> = gateway.registry().all().collect();
        output::print_json(&capabilities)?;
        return Ok(());
    }

    let rows = gateway
        .registry()
        .all()
        .map(|c| {
            vec![
                c.id.clone(),
                c.classification.to_string(),
                c.description.clone(),
            ]
        })
        .collect();
    output::print_table(&["CAPABILITY", "CLASS", "DESCRIPTION"], rows);
    Ok(())
}
