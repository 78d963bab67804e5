//! Tool names, argument keys and input schemas

use serde_json::{Map, Value};

pub const LIST_TABLES: &str = "list_tables";
pub const GET_TABLE_METADATA: &str = "get_table_metadata";
pub const GET_TABLES_METADATA: &str = "get_tables_metadata";
pub const GET_SCHEMA_OVERVIEW: &str = "get_schema_overview";

pub const SCHEMA_NAME: &str = "schema_name";
pub const TABLE_NAME: &str = "table_name";
pub const TABLE_NAMES: &str = "table_names";

/// Tool schema builder for manual schema creation
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub type_: String,
    pub properties: Map<String, Value>,
    pub required: Vec<String>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self {
            type_: "object".to_string(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    pub fn property(
        mut self,
        name: impl Into<String>,
        type_: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::String(type_.into()));
        prop.insert("description".to_string(), Value::String(description.into()));

        self.properties.insert(name.into(), Value::Object(prop));
        self
    }

    /// Property that may also be `null`
    pub fn nullable_property(
        mut self,
        name: impl Into<String>,
        type_: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut prop = Map::new();
        prop.insert(
            "type".to_string(),
            Value::Array(vec![Value::String(type_.into()), Value::String("null".to_string())]),
        );
        prop.insert("description".to_string(), Value::String(description.into()));

        self.properties.insert(name.into(), Value::Object(prop));
        self
    }

    pub fn array_property(
        mut self,
        name: impl Into<String>,
        item_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let mut items = Map::new();
        items.insert("type".to_string(), Value::String(item_type.into()));

        let mut prop = Map::new();
        prop.insert("type".to_string(), Value::String("array".to_string()));
        prop.insert("items".to_string(), Value::Object(items));
        prop.insert("description".to_string(), Value::String(description.into()));

        self.properties.insert(name.into(), Value::Object(prop));
        self
    }

    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    pub fn build_object(self) -> Map<String, Value> {
        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String(self.type_));
        schema.insert("properties".to_string(), Value::Object(self.properties));
        schema.insert(
            "required".to_string(),
            Value::Array(self.required.into_iter().map(Value::String).collect()),
        );
        schema
    }

    pub fn build(self) -> Value {
        Value::Object(self.build_object())
    }
}

impl Default for ToolSchema {
    fn default() -> Self {
        Self::new()
    }
}

/// A tool as advertised to clients
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Map<String, Value>,
}

/// The four metadata tools, in advertisement order
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: LIST_TABLES,
            description: "List the base tables of a schema, or of every non-system schema \
                          when schema_name is omitted. Returns schema, table_name and \
                          table_comment for each table.",
            input_schema: ToolSchema::new()
                .nullable_property(
                    SCHEMA_NAME,
                    "string",
                    "Schema to list; omit or null to list all user schemas",
                )
                .build_object(),
        },
        ToolDefinition {
            name: GET_TABLE_METADATA,
            description: "Describe one table for DDL documentation: table attributes, \
                          columns, primary key, unique keys, indexes, foreign keys and \
                          check constraints.",
            input_schema: ToolSchema::new()
                .property(SCHEMA_NAME, "string", "Schema containing the table")
                .property(TABLE_NAME, "string", "Table to describe")
                .required(SCHEMA_NAME)
                .required(TABLE_NAME)
                .build_object(),
        },
        ToolDefinition {
            name: GET_TABLES_METADATA,
            description: "Describe several tables of one schema at once. Tables that do not \
                          exist or fail are reported in place with an error field.",
            input_schema: ToolSchema::new()
                .property(SCHEMA_NAME, "string", "Schema containing the tables")
                .array_property(TABLE_NAMES, "string", "Tables to describe")
                .required(SCHEMA_NAME)
                .required(TABLE_NAMES)
                .build_object(),
        },
        ToolDefinition {
            name: GET_SCHEMA_OVERVIEW,
            description: "Summarize a schema: its base tables with comments and the \
                          foreign-key relationships between them.",
            input_schema: ToolSchema::new()
                .property(SCHEMA_NAME, "string", "Schema to summarize")
                .required(SCHEMA_NAME)
                .build_object(),
        },
    ]
}
