/// Web UI host for Bitbucket Cloud.
const WEB_BASE_URL: &str = "https://bitbucket.org";

/// Link to a pipeline's results page.
///
/// # Arguments
///
/// * `workspace` - Workspace slug (e.g., "acme")
/// * `repo` - Repository slug (e.g., "shop")
/// * `ordinal` - Build number shown in the UI (e.g., 42)
///
/// # Returns
///
/// Clickable URL (e.g., <https://bitbucket.org/acme/shop/pipelines/results/42>)
pub fn pipeline_url(workspace: &str, repo: &str, ordinal: u64) -> String {
    format!("{WEB_BASE_URL}/{workspace}/{repo}/pipelines/results/{ordinal}")
}

/// Link to a single step of a pipeline. The step UUID is used without its
/// braces, the way the web UI prints it.
pub fn step_url(workspace: &str, repo: &str, ordinal: u64, step_id: &str) -> String {
    format!(
        "{}/steps/{}",
        pipeline_url(workspace, repo, ordinal),
        strip_braces(step_id)
    )
}

fn strip_braces(uuid: &str) -> &str {
    uuid.trim_start_matches('{').trim_end_matches('}')
}
