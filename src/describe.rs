//! The `describe` command: print what a descriptor set resolves to.

use crate::config::SchemaArgs;
use crate::produce::load_graph;
use proto_schema::SchemaGraph;

pub fn describe(args: &SchemaArgs) -> anyhow::Result<String> {
    let graph = load_graph(args)?;
    Ok(render(&graph))
}

/// Resolved files with their message types, then unresolved files.
pub fn render(graph: &SchemaGraph) -> String {
    let mut lines = vec![format!(
        "Resolved files: {} ({} passes)",
        graph.files().len(),
        graph.passes()
    )];

    for file in graph.files() {
        let deps: Vec<&str> = file.dependencies().iter().map(|d| d.name()).collect();
        if deps.is_empty() {
            lines.push(format!("  {} [{}]", file.name(), file.package()));
        } else {
            lines.push(format!(
                "  {} [{}] imports {}",
                file.name(),
                file.package(),
                deps.join(", ")
            ));
        }
        for message in file.record().types.all_messages() {
            lines.push(format!(
                "    {} ({})",
                message.full_name,
                message.list_fields().join(", ")
            ));
        }
    }

    if graph.is_complete() {
        lines.push("Unresolved files: none".to_string());
    } else {
        lines.push(format!(
            "Unresolved files: {}",
            graph.unresolved_names().join(", ")
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}
