//! Dataflow visualization as Mermaid flowcharts.
//!
//! ```text
//! graph TD
//! subgraph stage_processing["Processing Stage"]
//!   subgraph op_add["add"]
//!     add["add"]
//!     add__input__numbers("numbers") --> add
//!     add --> add__output__sum("sum")
//!   end
//! end
//! subgraph inputs["Inputs"]
//!   seed__calc_string("calc_string")
//! end
//! ```
//!
//! Every stage gets a subgraph and every operation a nested subgraph with
//! one node per input and output key. [`DiagramOptions::simple`] collapses an
//! operation to a single node. Edges connect seed inputs and producing
//! outputs to the inputs that consume them; condition edges are dotted.
//!
//! Restricting the diagram to one stage drops the stage subgraphs.

use crate::dataflow::{DataFlow, InputSource};
use crate::types::{Definition, Stage};

/// Rendering options
#[derive(Debug, Clone)]
pub struct DiagramOptions {
    /// Stages to include; empty means all
    pub stages: Vec<Stage>,

    /// Collapse operations to a single node
    pub simple: bool,

    /// Mermaid direction: TD, LR, RL or BT
    pub display: String,
}

impl Default for DiagramOptions {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            simple: false,
            display: "TD".to_string(),
        }
    }
}

impl DiagramOptions {
    /// Only include `stage`
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Collapse operations to a single node
    pub fn simple(mut self) -> Self {
        self.simple = true;
        self
    }

    /// Set the flowchart direction
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }

    fn includes(&self, stage: Stage) -> bool {
        self.stages.is_empty() || self.stages.contains(&stage)
    }

    fn grouped(&self) -> bool {
        self.stages.len() != 1
    }
}

/// Render `dataflow` as a Mermaid flowchart
pub fn render_mermaid(dataflow: &DataFlow, options: &DiagramOptions) -> String {
    let mut output = String::new();
    output.push_str(&format!("graph {}\n", options.display));

    for stage in Stage::ALL {
        if !options.includes(stage) {
            continue;
        }
        let stage_node = format!("stage_{}", stage.as_str());
        if options.grouped() {
            output.push_str(&format!(
                "subgraph {}[\"{} Stage\"]\n",
                stage_node,
                title(stage.as_str())
            ));
            output.push_str(&format!(
                "style {} fill:#afd388b5,stroke:#a4ca7a\n",
                stage_node
            ));
        }

        for (instance_name, operation) in &dataflow.operations {
            if operation.stage != stage {
                continue;
            }
            let node = sanitize_id(instance_name);
            if !options.simple {
                output.push_str(&format!(
                    "  subgraph op_{}[\"{}\"]\n",
                    node,
                    escape_mermaid(instance_name)
                ));
                output.push_str(&format!(
                    "  style op_{} fill:#fff4de,stroke:#cece71\n",
                    node
                ));
            }
            output.push_str(&format!(
                "    {}[\"{}\"]\n",
                node,
                escape_mermaid(&operation.name)
            ));
            if !options.simple {
                for key in operation.inputs.keys() {
                    let input_node = input_node(instance_name, key);
                    output.push_str(&format!(
                        "    {}(\"{}\")\n",
                        input_node,
                        escape_mermaid(key)
                    ));
                    output.push_str(&format!("    {} --> {}\n", input_node, node));
                }
                for key in operation.outputs.keys() {
                    let output_node = output_node(instance_name, key);
                    output.push_str(&format!(
                        "    {}(\"{}\")\n",
                        output_node,
                        escape_mermaid(key)
                    ));
                    output.push_str(&format!("    {} --> {}\n", node, output_node));
                }
                output.push_str("  end\n");
            }
        }

        if options.grouped() {
            output.push_str("end\n");
        }
    }

    if options.grouped() {
        output.push_str("subgraph inputs[\"Inputs\"]\n");
        output.push_str("style inputs fill:#f6dbf9,stroke:#a178ca\n");
    }

    let mut seeds_drawn = Vec::new();
    for (instance_name, operation) in &dataflow.operations {
        if !options.includes(operation.stage) {
            continue;
        }
        let node = sanitize_id(instance_name);

        for (key, definition) in &operation.inputs {
            let target = if options.simple {
                node.clone()
            } else {
                input_node(instance_name, key)
            };
            for source in dataflow.sources(definition) {
                let from = source_node(&source, definition, options, &mut seeds_drawn, &mut output);
                output.push_str(&format!("  {} --> {}\n", from, target));
            }
        }

        for definition in &operation.conditions {
            for source in dataflow.sources(definition) {
                let from = source_node(&source, definition, options, &mut seeds_drawn, &mut output);
                output.push_str(&format!("  {} -.-> {}\n", from, node));
            }
        }
    }

    if options.grouped() {
        output.push_str("end\n");
    }

    output
}

fn source_node(
    source: &InputSource,
    definition: &Definition,
    options: &DiagramOptions,
    seeds_drawn: &mut Vec<String>,
    output: &mut String,
) -> String {
    match source {
        InputSource::Seed => {
            let seed_node = format!("seed__{}", sanitize_id(&definition.name));
            if !seeds_drawn.contains(&seed_node) {
                output.push_str(&format!(
                    "  {}(\"{}\")\n",
                    seed_node,
                    escape_mermaid(&definition.name)
                ));
                if !options.grouped() {
                    output.push_str(&format!(
                        "  style {} fill:#f6dbf9,stroke:#a178ca\n",
                        seed_node
                    ));
                }
                seeds_drawn.push(seed_node.clone());
            }
            seed_node
        }
        InputSource::Operation {
            instance_name,
            output: key,
        } => {
            if options.simple {
                sanitize_id(instance_name)
            } else {
                output_node(instance_name, key)
            }
        }
    }
}

fn input_node(instance_name: &str, key: &str) -> String {
    format!("{}__input__{}", sanitize_id(instance_name), sanitize_id(key))
}

fn output_node(instance_name: &str, key: &str) -> String {
    format!("{}__output__{}", sanitize_id(instance_name), sanitize_id(key))
}

fn title(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Escape characters Mermaid treats specially inside labels
fn escape_mermaid(s: &str) -> String {
    s.replace('"', "#quot;")
        .replace('<', "#lt;")
        .replace('>', "#gt;")
}

/// Make a name safe to use as a Mermaid node id
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Input, Operation};

    fn calc() -> DataFlow {
        let calc_string = Definition::new("calc_string", "str");
        let is_add = Definition::new("is_add", "bool");
        let numbers = Definition::new("numbers", "List[int]");
        let result = Definition::new("result", "int");

        DataFlow::auto([
            Operation::new("parse_line")
                .with_input("line", calc_string.clone())
                .with_output("add", is_add.clone())
                .with_output("numbers", numbers.clone()),
            Operation::new("add")
                .with_input("numbers", numbers)
                .with_output("sum", result.clone())
                .with_condition(is_add),
            Operation::new("get_single")
                .with_input("spec", result)
                .with_stage(Stage::Output),
        ])
        .with_seed(Input::new("add 40 and 2", &calc_string))
    }

    #[test]
    fn test_full_diagram() {
        let diagram = calc().diagram(&DiagramOptions::default());

        assert!(diagram.starts_with("graph TD\n"));
        assert!(diagram.contains("subgraph stage_processing[\"Processing Stage\"]"));
        assert!(diagram.contains("subgraph stage_output[\"Output Stage\"]"));
        assert!(diagram.contains("subgraph op_parse_line[\"parse_line\"]"));
        assert!(diagram.contains("add__input__numbers(\"numbers\")"));
        assert!(diagram.contains("parse_line__output__numbers --> add__input__numbers"));
        assert!(diagram.contains("seed__calc_string --> parse_line__input__line"));
        assert!(diagram.contains("parse_line__output__add -.-> add"));
        assert!(diagram.contains("subgraph inputs[\"Inputs\"]"));

        let opened = diagram.lines().filter(|l| l.trim_start().starts_with("subgraph")).count();
        let closed = diagram.lines().filter(|l| l.trim() == "end").count();
        assert_eq!(opened, closed);
    }

    #[test]
    fn test_simple_single_stage() {
        let options = DiagramOptions::default()
            .with_stage(Stage::Processing)
            .simple()
            .with_display("LR");
        let diagram = calc().diagram(&options);

        assert!(diagram.starts_with("graph LR\n"));
        assert!(!diagram.contains("subgraph"));
        assert!(!diagram.contains("get_single"));
        assert!(diagram.contains("parse_line --> add"));
        assert!(diagram.contains("seed__calc_string --> parse_line"));
        assert!(diagram.contains("style seed__calc_string"));
    }

    #[test]
    fn test_escape_and_sanitize() {
        assert_eq!(escape_mermaid("a \"b\" <c>"), "a #quot;b#quot; #lt;c#gt;");
        assert_eq!(sanitize_id("my-op.v2 x"), "my_op_v2_x");
        assert_eq!(title("cleanup"), "Cleanup");
    }
}
