//! Canned markup used when no provider credential is configured.

use crate::model::DiagramKind;

pub const FLOWCHART_DOT: &str = r#"digraph flowchart {
    rankdir=TB;
    node [shape=box, style=rounded];

    start [label="Start", shape=ellipse];
    process [label="Process"];
    end [label="End", shape=ellipse];

    start -> process;
    process -> end;
}"#;

pub const NETWORK_DOT: &str = r#"graph network {
    node [shape=circle];

    A [label="Node A"];
    B [label="Node B"];
    C [label="Node C"];
    D [label="Node D"];

    A -- B;
    B -- C;
    C -- D;
    D -- A;
    A -- C;
}"#;

pub const BREAKDOWN_WBS: &str = r#"@startwbs
* Project
** Planning
*** Scope
*** Schedule
** Execution
*** Build
*** Test
** Closure
*** Handover
@endwbs"#;

pub const TIMELINE_GANTT: &str = r#"gantt
    title Project Timeline
    dateFormat YYYY-MM-DD
    section Planning
    Requirements    :p1, 2024-01-01, 5d
    Design          :p2, after p1, 5d
    section Delivery
    Implementation  :d1, after p2, 10d
    Review          :d2, after d1, 3d"#;

const DIRECTED_KEYWORDS: [&str; 6] = ["flowchart", "flow", "process", "step", "sequence", "hierarchy"];

/// Picks a template from keywords in the prompt. Deterministic.
pub fn template_for(prompt: &str, kind: DiagramKind) -> &'static str {
    match kind {
        DiagramKind::Graph => {
            let lowered = prompt.to_lowercase();
            if DIRECTED_KEYWORDS.iter().any(|k| lowered.contains(k)) {
                FLOWCHART_DOT
            } else {
                NETWORK_DOT
            }
        }
        DiagramKind::Breakdown => BREAKDOWN_WBS,
        DiagramKind::Timeline => TIMELINE_GANTT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flowchart_keyword_selects_directed_template() {
        assert_eq!(
            template_for("Draw a Flowchart with start, process, end", DiagramKind::Graph),
            FLOWCHART_DOT
        );
        assert_eq!(
            template_for("friends and their friends", DiagramKind::Graph),
            NETWORK_DOT
        );
    }

    #[test]
    fn non_graph_kinds_have_one_template() {
        assert!(template_for("x", DiagramKind::Breakdown).starts_with("@startwbs"));
        assert!(template_for("x", DiagramKind::Timeline).starts_with("gantt"));
    }
}
