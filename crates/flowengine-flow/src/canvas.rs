//! Conversion from the authoring "canvas" Flow JSON form (`nodes`, `edges`,
//! `globalConfig`) into the engine form this crate otherwise works with.
//!
//! The canvas form is what a visual flow-builder UI naturally produces:
//! nodes carry display/layout data the engine doesn't care about, and edges
//! are a flat `source`/`target`/`label` list rather than being nested under
//! each node. `flow_from_canvas` discards the layout noise and re-shapes the
//! rest into the engine's `Flow`/`Node`/`Connection` layout so callers never
//! need to know which form they received (§6).

use serde_json::Value;

use crate::error::{FlowError, Result};
use crate::model::Flow;

/// Convert a canvas-form document into an engine-form [`Flow`].
///
/// Heuristic: a document is treated as canvas-form when it has an `edges`
/// key (engine form uses `connections`). Canvas `edges[].data.label`
/// becomes `Connection.label`; everything else in a canvas node's `data`
/// blob maps onto the matching engine `Node` field by name, so a canvas
/// tool that already emits engine-shaped field names needs no special
/// casing here.
pub fn flow_from_canvas(mut value: Value) -> Result<Flow> {
    let obj = value
        .as_object_mut()
        .ok_or_else(|| FlowError::Malformed("canvas flow is not a JSON object".to_string()))?;

    let edges = obj
        .remove("edges")
        .ok_or_else(|| FlowError::Malformed("canvas flow missing 'edges'".to_string()))?;
    let edges = edges
        .as_array()
        .ok_or_else(|| FlowError::Malformed("'edges' is not an array".to_string()))?;

    let mut connections = Vec::with_capacity(edges.len());
    for (i, edge) in edges.iter().enumerate() {
        let source = edge
            .get("source")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Malformed(format!("edge {i} missing 'source'")))?;
        let target = edge
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Malformed(format!("edge {i} missing 'target'")))?;
        let data = edge.get("data");
        let label = data
            .and_then(|d| d.get("label"))
            .and_then(Value::as_str)
            .unwrap_or(source)
            .to_string();
        let description = data
            .and_then(|d| d.get("description"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let else_option = data
            .and_then(|d| d.get("elseOption"))
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let id = edge
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("edge-{i}"));

        connections.push(serde_json::json!({
            "id": id,
            "label": label,
            "description": description,
            "else_option": else_option,
            "source": source,
            "target": target,
        }));
    }

    let nodes = obj
        .remove("nodes")
        .ok_or_else(|| FlowError::Malformed("canvas flow missing 'nodes'".to_string()))?;
    let nodes = nodes
        .as_array()
        .ok_or_else(|| FlowError::Malformed("'nodes' is not an array".to_string()))?;

    let mut engine_nodes = Vec::with_capacity(nodes.len());
    let mut first_node_id: Option<String> = None;
    for node in nodes {
        let id = node
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Malformed("canvas node missing 'id'".to_string()))?
            .to_string();
        // Canvas node data is typically nested under `data`; flatten it
        // alongside top-level fields so either layout works.
        let mut flattened = node.clone();
        if let Some(data) = node.get("data").cloned() {
            if let (Some(flat_obj), Some(data_obj)) =
                (flattened.as_object_mut(), data.as_object())
            {
                for (k, v) in data_obj {
                    flat_obj.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
        flattened["id"] = Value::String(id.clone());

        let is_start = flattened
            .get("is_start")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if is_start && first_node_id.is_none() {
            first_node_id = Some(id.clone());
        }

        engine_nodes.push(flattened);
    }

    let global_config = obj.remove("globalConfig").unwrap_or(serde_json::json!({}));
    let first_node_id = first_node_id
        .or_else(|| {
            obj.get("first_node_id")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .ok_or_else(|| {
            FlowError::Malformed(
                "canvas flow has no node with is_start=true and no first_node_id".to_string(),
            )
        })?;

    let engine_value = serde_json::json!({
        "first_node_id": first_node_id,
        "nodes": engine_nodes,
        "connections": connections,
        "global_objective": global_config.get("objective").and_then(Value::as_str).unwrap_or_default(),
        "global_tone": global_config.get("tone").and_then(Value::as_str).unwrap_or_default(),
        "global_language": global_config.get("language").and_then(Value::as_str).unwrap_or_default(),
        "global_behaviour": global_config.get("behaviour").and_then(Value::as_str).unwrap_or_default(),
        "global_values": global_config.get("values").and_then(Value::as_str).unwrap_or_default(),
    });

    Flow::from_json(engine_value)
}

/// Parse a Flow document that may be in either the engine form or the
/// canvas form, detecting which by presence of the `edges` key.
pub fn flow_from_either(value: Value) -> Result<Flow> {
    if value.get("edges").is_some() {
        flow_from_canvas(value)
    } else {
        Flow::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_simple_canvas_flow() {
        let canvas = json!({
            "nodes": [
                {"id": "start", "node_type": "start", "is_start": true},
                {"id": "end", "node_type": "end", "is_end": true}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "end", "data": {"label": "to-end", "description": "go"}}
            ],
            "globalConfig": {"objective": "help the user"}
        });
        let flow = flow_from_canvas(canvas).expect("should convert");
        assert_eq!(flow.first_node_id, "start");
        assert_eq!(flow.connections[0].label, "to-end");
        assert_eq!(flow.global_objective, "help the user");
    }

    #[test]
    fn detects_engine_form_without_edges() {
        let engine = json!({
            "first_node_id": "start",
            "nodes": [{"id": "start", "node_type": "start"}],
            "connections": []
        });
        let flow = flow_from_either(engine).expect("should parse as engine form");
        assert_eq!(flow.first_node_id, "start");
    }
}
