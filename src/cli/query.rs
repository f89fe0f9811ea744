/// Build `--query` flags projecting a single object response.
///
/// `build_query(&["id", "name"])` yields `--query data.{id:id, name:name}`;
/// with no fields the whole `data` payload is selected.
pub fn build_query(fields: &[&str]) -> Vec<String> {
    if fields.is_empty() {
        return vec!["--query".to_string(), "data".to_string()];
    }
    vec!["--query".to_string(), format!("data.{{{}}}", projection(fields))]
}

/// Build `--query` flags projecting a list response, with `--all` appended so
/// the CLI follows its own pagination.
pub fn build_array_query(fields: &[&str]) -> Vec<String> {
    let query = if fields.is_empty() {
        "data[]".to_string()
    } else {
        format!("data[].{{{}}}", projection(fields))
    };
    vec!["--query".to_string(), query, "--all".to_string()]
}

fn projection(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| format!("{f}:{f}"))
        .collect::<Vec<_>>()
        .join(", ")
}
