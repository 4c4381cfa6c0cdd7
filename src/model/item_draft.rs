use log::warn;
use serde_json::{json, Map, Value};

use crate::model::source_item::SourceItem;
use crate::sync::error::SyncError;
use crate::sync::mapping::{MappingContext, StatusMapper, SyncFields};

/// What a board item should look like after a sync write, derived from one
/// source item. Knows how to render itself as a create payload or as a
/// JSON-Patch operation list for an update.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub name: String,
    pub source_key: String,
    /// Rendered Markdown body.
    pub description: String,
    pub status_id: Option<String>,
    /// Source `updated` value, written through as the new watermark.
    pub updated: String,
}

impl ItemDraft {
    pub fn from_source(source: &SourceItem, mapper: &StatusMapper) -> Self {
        Self {
            name: source.title.clone(),
            source_key: source.key.clone(),
            description: source.build_markdown_description(),
            status_id: mapper.resolve(source.status_name()),
            updated: source.updated.clone(),
        }
    }

    /// Payload for `POST /items`, written with the markdown media type.
    pub fn create_payload(
        &self,
        context: &MappingContext,
        fields: &SyncFields,
    ) -> Result<Value, SyncError> {
        let fields_dict = self.fields_dict(context, fields)?;
        Ok(json!({
            "name": self.name,
            "description": {
                "markdown": self.description,
                "richText": true,
            },
            "statusId": self.status_id,
            "color": "blue",
            "assigneeUserIds": [],
            "assigneeUserGroupIds": [],
            "order": 0,
            "fields": fields_dict,
        }))
    }

    /// JSON-Patch operations for `PATCH /items/{id}`. With the markdown
    /// media type the description is patched as a bare string.
    pub fn patch_ops(
        &self,
        context: &MappingContext,
        fields: &SyncFields,
    ) -> Result<Value, SyncError> {
        let mut ops = vec![
            json!({"op": "replace", "path": "/name", "value": self.name}),
            json!({"op": "replace", "path": "/description", "value": self.description}),
        ];
        if let Some(status_id) = &self.status_id {
            ops.push(json!({"op": "replace", "path": "/statusId", "value": status_id}));
        }
        for (field_id, value) in self.fields_dict(context, fields)? {
            ops.push(json!({
                "op": "replace",
                "path": format!("/fields/{field_id}"),
                "value": value,
            }));
        }
        Ok(Value::Array(ops))
    }

    /// Custom field values for either payload shape. The correlation field is
    /// required; the watermark and team fields degrade to a warning when the
    /// workspace schema does not carry them.
    fn fields_dict(
        &self,
        context: &MappingContext,
        fields: &SyncFields,
    ) -> Result<Map<String, Value>, SyncError> {
        let mut dict = Map::new();

        let key_field_id =
            context
                .field_id(&fields.key_field)
                .ok_or_else(|| SyncError::FieldMissing {
                    name: fields.key_field.clone(),
                })?;
        dict.insert(key_field_id.to_string(), json!({"text": self.source_key}));

        match context.field_id(&fields.watermark_field) {
            Some(id) => {
                dict.insert(id.to_string(), json!({"text": self.updated}));
            }
            None => warn!(
                "watermark field '{}' missing; {} will look always-changed on future runs",
                fields.watermark_field, self.source_key
            ),
        }

        if let Some(team) = &fields.team {
            match context.option_id(&team.field, &team.value) {
                Some(option_id) => {
                    let field_id = context.field_id(&team.field).unwrap_or_default().to_string();
                    dict.insert(field_id, json!({"selection": [option_id]}));
                }
                None => warn!(
                    "team option '{}' unresolved for field '{}'; omitted for {}",
                    team.value, team.field, self.source_key
                ),
            }
        }

        Ok(dict)
    }
}
