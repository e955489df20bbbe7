//! Per-stage instruction sets.
//!
//! These frame the worker's task for each stage; the worker prepends them to
//! whatever prompt it assembles for its model.

use conveyor_core::types::Stage;

pub fn for_stage(stage: Stage) -> &'static str {
    match stage {
        Stage::Requirements => {
            "Capture the task as concrete, testable requirements. List functional \
             requirements, constraints, and out-of-scope items. Declare the \
             requirements document as an artifact."
        }
        Stage::Architecture => {
            "Design the solution for the captured requirements. Name the components, \
             their responsibilities, and the data flow between them. Declare the \
             design document as an artifact."
        }
        Stage::CodeGeneration => {
            "Implement the design. If the context contains a rejected review, fix \
             every issue it flagged before anything else. Declare each produced \
             source file as an artifact."
        }
        Stage::CodeReview => {
            "Review the generated code against the requirements and design. Flag \
             every defect as an issue with severity info, minor, or critical. Report \
             verdict pass only if the code is acceptable as-is."
        }
        Stage::Testing => {
            "Write tests covering the requirements, including edge cases the review \
             flagged. Declare each test file as an artifact and report verdict pass \
             only if the suite passes."
        }
        Stage::Documentation => {
            "Document the implemented solution: what it does, how to use it, and any \
             known limitations. Declare the documentation as an artifact."
        }
    }
}
