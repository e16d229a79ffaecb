/// Literal marker the verifier must emit when the draft holds up
pub const STATUS_VERIFIED: &str = "STATUS: VERIFIED";
/// Literal marker the verifier must emit when the draft fails
pub const STATUS_FAILED: &str = "STATUS: FAILED";

pub const SYSTEM_INSTRUCTION: &str = r#"You are a senior debugging engineer embedded in the user's workspace.

The user shares source files, logs, metrics, screenshots and issue reports. Each text file arrives wrapped as:
--- START OF <KIND> (<name>) ---
...
--- END OF <KIND> ---

PROTOCOL:
- Before answering, reason step by step inside a single <thinking>...</thinking> block. Keep it out of the final answer.
- After the thinking block, give the answer the user will read.
- Ground every claim in the files provided. If something needed is missing, say which file would settle it.
- When you change code, show the complete updated file in a fenced code block preceded by its file name, so it can be applied directly.
- Prefer the smallest change that fixes the root cause. Call out anything you are unsure about."#;

/// Verification prompt: the backend plays QA and simulates the draft.
pub fn verify_prompt(request: &str, draft: &str) -> String {
    format!(
        r#"Act as a QA engineer running a simulation. Mentally execute the proposed solution below against the original request, including edge cases (empty input, boundaries, error paths, concurrency if relevant).

ORIGINAL REQUEST:
{request}

PROPOSED SOLUTION:
{draft}

Respond with exactly one of:
{verified}
or
{failed}
<concise list of concrete defects, each with the input that triggers it>

Do not propose a fix. Only judge the solution."#,
        request = request,
        draft = draft,
        verified = STATUS_VERIFIED,
        failed = STATUS_FAILED,
    )
}

/// Refinement prompt: demand a full rewrite addressing the reported defects.
pub fn refine_prompt(failure_report: &str) -> String {
    format!(
        r#"The simulation found problems with your previous solution:

{failure_report}

Rewrite the solution from scratch so that every defect above is fixed. Return the complete corrected answer, not a diff against the previous one, and do not drop anything from the original solution that was correct."#,
        failure_report = failure_report,
    )
}

/// Shown in place of a verifier trace when the backend exposed none
pub const VERIFY_TRACE_PLACEHOLDER: &str =
    "The verifier simulated the draft against the request without exposing its reasoning.";
/// Shown in place of a refinement trace when the backend exposed none
pub const REPAIR_TRACE_PLACEHOLDER: &str =
    "The solution was rewritten to address the reported defects.";

/// Verification section of the combined trace.
pub fn verification_section(trace: Option<&str>, passed: bool, report: Option<&str>) -> String {
    let mut out = String::from("### Verification (simulation)\n");
    out.push_str(trace.unwrap_or(VERIFY_TRACE_PLACEHOLDER));
    if passed {
        out.push_str("\n\nResult: Pass");
    } else {
        out.push_str("\n\nResult: Fail");
        if let Some(report) = report.map(str::trim).filter(|r| !r.is_empty()) {
            out.push('\n');
            out.push_str(report);
        }
    }
    out
}

/// "Repair applied" section of the combined trace.
pub fn repair_section(trace: Option<&str>) -> String {
    format!(
        "### Repair applied\n{}",
        trace.unwrap_or(REPAIR_TRACE_PLACEHOLDER)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_prompt_embeds_request_and_draft() {
        let prompt = verify_prompt("sum a list", "fn sum() {}");
        assert!(prompt.contains("sum a list"));
        assert!(prompt.contains("fn sum() {}"));
        assert!(prompt.contains(STATUS_VERIFIED));
        assert!(prompt.contains(STATUS_FAILED));
    }

    #[test]
    fn test_refine_prompt_embeds_failure() {
        let prompt = refine_prompt("STATUS: FAILED\nreason: off by one");
        assert!(prompt.contains("off by one"));
        assert!(prompt.contains("from scratch"));
    }

    #[test]
    fn test_verification_section_placeholder() {
        let section = verification_section(None, true, None);
        assert!(section.contains(VERIFY_TRACE_PLACEHOLDER));
        assert!(section.ends_with("Result: Pass"));
    }

    #[test]
    fn test_failed_verification_section_includes_report() {
        let section = verification_section(Some("ran it"), false, Some("STATUS: FAILED\nboom"));
        assert!(section.contains("ran it"));
        assert!(section.contains("Result: Fail\nSTATUS: FAILED\nboom"));
    }
}
