//! Default job names

/// Reduces a name to lowercase alphanumerics separated by single hyphens
pub fn sanitize_job_name(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.to_lowercase().chars() {
        let c = if c.is_alphanumeric() { c } else { '-' };
        if c == '-' && sanitized.ends_with('-') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.trim_matches('-').to_string()
}

/// Builds a job name from the scope, e.g. `gen9ou-elo1500`
///
/// A job without a format is named `all`.
pub fn generate_job_name(format_id: Option<&str>, min_elo: i64) -> String {
    let format_id = format_id.filter(|f| !f.is_empty()).unwrap_or("all");
    let name = if min_elo > 0 {
        format!("{}-elo{}", format_id, min_elo)
    } else {
        format_id.to_string()
    };
    sanitize_job_name(&name)
}
