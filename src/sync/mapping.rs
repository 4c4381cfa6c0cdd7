use std::collections::BTreeMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// One status definition from the board workspace schema. Order matters:
/// the final fallback in status resolution is "first status on the board".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "typeId")]
    pub type_id: String,
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

/// Immutable snapshot of the board workspace schema: custom fields and the
/// status list, in board order. Built once per run from a schema fetch (or a
/// saved snapshot) and passed into the components that need lookups —
/// reloading is an explicit new construction, never an ambient cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingContext {
    pub fields: Vec<FieldDef>,
    pub statuses: Vec<StatusDef>,
}

impl MappingContext {
    pub fn new(fields: Vec<FieldDef>, statuses: Vec<StatusDef>) -> Self {
        Self { fields, statuses }
    }

    pub fn field_id(&self, name: &str) -> Option<&str> {
        let id = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.id.as_str());
        if id.is_none() {
            warn!("field '{name}' not found in workspace schema");
        }
        id
    }

    /// Option id of a select-field option, by field name and option name.
    pub fn option_id(&self, field_name: &str, option_name: &str) -> Option<&str> {
        let Some(field) = self.fields.iter().find(|f| f.name == field_name) else {
            warn!("field '{field_name}' not found in workspace schema");
            return None;
        };
        if field.type_id != "select" {
            warn!(
                "field '{field_name}' is not a select field (type: {})",
                field.type_id
            );
            return None;
        }
        let id = field
            .options
            .iter()
            .find(|o| o.name == option_name)
            .map(|o| o.id.as_str());
        if id.is_none() {
            warn!("option '{option_name}' not found in select field '{field_name}'");
        }
        id
    }

    pub fn status_id(&self, name: &str) -> Option<&str> {
        self.statuses
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id.as_str())
    }

    fn default_status(&self) -> Option<&StatusDef> {
        self.statuses.iter().find(|s| s.default)
    }

    fn first_status(&self) -> Option<&StatusDef> {
        self.statuses.first()
    }
}

/// Names of the custom fields the engine reads and writes on board items.
/// The correlation key is required for matching; the watermark field stores
/// the source timestamp recorded at the last successful sync write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFields {
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default = "default_watermark_field")]
    pub watermark_field: String,
    /// Optional select field stamped with a fixed team value on every write.
    #[serde(default)]
    pub team: Option<TeamField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamField {
    pub field: String,
    pub value: String,
}

fn default_key_field() -> String {
    "JIRA-KEY".to_string()
}

fn default_watermark_field() -> String {
    "SYNCED-AT".to_string()
}

impl Default for SyncFields {
    fn default() -> Self {
        Self {
            key_field: default_key_field(),
            watermark_field: default_watermark_field(),
            team: None,
        }
    }
}

/// Maps a source status name to a board status id through the configured
/// variant table plus a fallback chain.
pub struct StatusMapper<'a> {
    context: &'a MappingContext,
    /// board status name -> accepted source status variants
    mapping: &'a BTreeMap<String, Vec<String>>,
    default_status: &'a str,
}

impl<'a> StatusMapper<'a> {
    pub fn new(
        context: &'a MappingContext,
        mapping: &'a BTreeMap<String, Vec<String>>,
        default_status: &'a str,
    ) -> Self {
        Self {
            context,
            mapping,
            default_status,
        }
    }

    /// Resolution order, first hit wins:
    /// 1. configured variant table
    /// 2. configured default status name
    /// 3. the board's default-flagged status
    /// 4. the first status on the board
    /// 5. none — the item is written without a status
    pub fn resolve(&self, source_status: &str) -> Option<String> {
        if source_status.is_empty() {
            return None;
        }

        for (board_status, variants) in self.mapping {
            if variants.iter().any(|v| v == source_status) {
                if let Some(id) = self.context.status_id(board_status) {
                    debug!("mapped source status '{source_status}' to board status '{board_status}'");
                    return Some(id.to_string());
                }
            }
        }

        warn!(
            "source status '{source_status}' not in status mapping; falling back to '{}'",
            self.default_status
        );
        if let Some(id) = self.context.status_id(self.default_status) {
            return Some(id.to_string());
        }

        if let Some(status) = self.context.default_status() {
            info!("using board default status '{}'", status.name);
            return Some(status.id.clone());
        }

        if let Some(status) = self.context.first_status() {
            warn!(
                "no mapped or default status for '{source_status}'; using first board status '{}'",
                status.name
            );
            return Some(status.id.clone());
        }

        warn!("could not resolve any board status for '{source_status}'; leaving status empty");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> MappingContext {
        MappingContext::new(
            vec![
                FieldDef {
                    id: "f-key".to_string(),
                    name: "JIRA-KEY".to_string(),
                    type_id: "text".to_string(),
                    options: vec![],
                },
                FieldDef {
                    id: "f-team".to_string(),
                    name: "Team".to_string(),
                    type_id: "select".to_string(),
                    options: vec![FieldOption {
                        id: "opt-platform".to_string(),
                        name: "Platform".to_string(),
                    }],
                },
            ],
            vec![
                StatusDef {
                    id: "st-draft".to_string(),
                    name: "Draft".to_string(),
                    default: false,
                },
                StatusDef {
                    id: "st-progress".to_string(),
                    name: "In Progress".to_string(),
                    default: true,
                },
            ],
        )
    }

    fn mapping() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(
            "In Progress".to_string(),
            vec!["In Progress".to_string(), "In Arbeit".to_string()],
        )])
    }

    #[test]
    fn resolves_through_variant_table() {
        let ctx = context();
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "Draft");
        assert_eq!(mapper.resolve("In Arbeit"), Some("st-progress".to_string()));
    }

    #[test]
    fn unmapped_status_falls_back_to_configured_default() {
        let ctx = context();
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "Draft");
        assert_eq!(mapper.resolve("Weird"), Some("st-draft".to_string()));
    }

    #[test]
    fn missing_configured_default_falls_back_to_board_default() {
        let ctx = context();
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "No Such Status");
        assert_eq!(mapper.resolve("Weird"), Some("st-progress".to_string()));
    }

    #[test]
    fn falls_back_to_first_status_when_nothing_is_default() {
        let mut ctx = context();
        ctx.statuses[1].default = false;
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "No Such Status");
        assert_eq!(mapper.resolve("Weird"), Some("st-draft".to_string()));
    }

    #[test]
    fn empty_board_resolves_to_none() {
        let ctx = MappingContext::default();
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "Draft");
        assert_eq!(mapper.resolve("Weird"), None);
    }

    #[test]
    fn empty_source_status_resolves_to_none() {
        let ctx = context();
        let map = mapping();
        let mapper = StatusMapper::new(&ctx, &map, "Draft");
        assert_eq!(mapper.resolve(""), None);
    }

    #[test]
    fn field_and_option_lookups() {
        let ctx = context();
        assert_eq!(ctx.field_id("JIRA-KEY"), Some("f-key"));
        assert_eq!(ctx.field_id("Nope"), None);
        assert_eq!(ctx.option_id("Team", "Platform"), Some("opt-platform"));
        assert_eq!(ctx.option_id("Team", "Nope"), None);
        assert_eq!(ctx.option_id("JIRA-KEY", "Platform"), None);
    }
}
