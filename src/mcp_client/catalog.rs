//! The fixed tool catalog agreed upon with the VFB MCP provider.
//!
//! Unlike a discovery-based registry, this catalog is versioned with the
//! crate: three tools, their descriptions, and their parameter schemas.
//! Validation happens locally before any network call.

use crate::inference::types::{FunctionDefinition, ToolDefinition};

/// Catalog version, logged at client startup and pinned by a test — bumped
/// when the provider's tool contract changes, so mismatches show up in code
/// review rather than prod.
pub const CATALOG_VERSION: &str = "2024-06";

/// A single tool in the fixed catalog.
#[derive(Debug, Clone)]
pub struct CatalogTool {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON Schema for the arguments object.
    pub params_schema: fn() -> serde_json::Value,
    /// Required top-level argument keys, checked before dispatch.
    pub required: &'static [&'static str],
}

/// The three VFB tools.
const TOOLS: &[CatalogTool] = &[
    CatalogTool {
        name: "search_terms",
        description: "Search for Virtual Fly Brain terms by free-text query. \
            Returns matching terms with their canonical IDs, labels, and synonyms.",
        params_schema: search_terms_schema,
        required: &["query"],
    },
    CatalogTool {
        name: "get_term_info",
        description: "Get detailed information about a VFB term by its canonical ID \
            (e.g. FBbt_00003682). Includes the definition, synonyms, and any aligned \
            image thumbnails.",
        params_schema: get_term_info_schema,
        required: &["id"],
    },
    CatalogTool {
        name: "run_query",
        description: "Run a predefined VFB query against a term, e.g. list the \
            neurons with presynaptic terminals in a given neuropil.",
        params_schema: run_query_schema,
        required: &["query_type", "term_id"],
    },
];

fn search_terms_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "Free-text search query, e.g. 'mushroom body'"
            },
            "offset": {
                "type": "integer",
                "description": "Result offset for pagination (default 0)"
            },
            "limit": {
                "type": "integer",
                "description": "Maximum results to return (default 10)"
            }
        },
        "required": ["query"]
    })
}

fn get_term_info_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "id": {
                "type": "string",
                "description": "Canonical VFB term ID, e.g. FBbt_00003682"
            }
        },
        "required": ["id"]
    })
}

fn run_query_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query_type": {
                "type": "string",
                "description": "Predefined query name, e.g. 'ListAllAvailableImages'"
            },
            "term_id": {
                "type": "string",
                "description": "Canonical VFB term ID the query runs against"
            }
        },
        "required": ["query_type", "term_id"]
    })
}

/// Look up a catalog entry by name.
pub fn get_tool(name: &str) -> Option<&'static CatalogTool> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Names of all catalog tools.
pub fn tool_names() -> Vec<&'static str> {
    TOOLS.iter().map(|t| t.name).collect()
}

/// Validate a tool call against the catalog before dispatching it.
///
/// Checks the tool exists, the arguments are an object, and every required
/// key is present. Value-level validation is left to the provider.
pub fn validate_tool_call(
    name: &str,
    arguments: &serde_json::Value,
) -> Result<(), super::errors::McpError> {
    use super::errors::McpError;

    let tool = get_tool(name).ok_or_else(|| McpError::UnknownTool { name: name.to_string() })?;

    let obj = arguments.as_object().ok_or_else(|| McpError::InvalidArguments {
        tool: name.to_string(),
        reason: "arguments must be a JSON object".to_string(),
    })?;

    for key in tool.required {
        if !obj.contains_key(*key) {
            return Err(McpError::InvalidArguments {
                tool: name.to_string(),
                reason: format!("missing required argument '{key}'"),
            });
        }
    }
    Ok(())
}

/// Convert the catalog to OpenAI function-calling tool definitions.
pub fn to_openai_tools() -> Vec<ToolDefinition> {
    TOOLS
        .iter()
        .map(|t| ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: t.name.to_string(),
                description: t.description.to_string(),
                parameters: (t.params_schema)(),
            },
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_three_tools() {
        assert_eq!(tool_names(), vec!["search_terms", "get_term_info", "run_query"]);
    }

    #[test]
    fn tool_contract_is_pinned_to_the_catalog_version() {
        // Changing the tool list or its required keys is a provider contract
        // change: bump CATALOG_VERSION alongside this assertion.
        assert_eq!(CATALOG_VERSION, "2024-06");
        let contract: Vec<(&str, &[&str])> =
            TOOLS.iter().map(|t| (t.name, t.required)).collect();
        assert_eq!(
            contract,
            vec![
                ("search_terms", &["query"][..]),
                ("get_term_info", &["id"][..]),
                ("run_query", &["query_type", "term_id"][..]),
            ]
        );
    }

    #[test]
    fn validate_accepts_well_formed_call() {
        let args = serde_json::json!({"query": "mushroom body"});
        assert!(validate_tool_call("search_terms", &args).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_tool() {
        let err = validate_tool_call("delete_everything", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, super::super::errors::McpError::UnknownTool { .. }));
    }

    #[test]
    fn validate_rejects_missing_required_key() {
        let err = validate_tool_call("get_term_info", &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, super::super::errors::McpError::InvalidArguments { .. }));
    }

    #[test]
    fn validate_rejects_non_object_arguments() {
        let err = validate_tool_call("search_terms", &serde_json::json!("query")).unwrap_err();
        assert!(matches!(err, super::super::errors::McpError::InvalidArguments { .. }));
    }

    #[test]
    fn openai_conversion_keeps_schemas() {
        let tools = to_openai_tools();
        assert_eq!(tools.len(), 3);
        let search = &tools[0];
        assert_eq!(search.function.name, "search_terms");
        assert_eq!(
            search.function.parameters["required"],
            serde_json::json!(["query"])
        );
    }
}
