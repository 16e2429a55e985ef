use serde_json::{Deserializer, Value};

use super::{RecordTranslator, TranslationStats};
use crate::error::CrosswalkError;

impl RecordTranslator<'_> {
    /// Translates label leaves in a JSON document and returns a single top-level array.
    ///
    /// The input may be one array (kept as is), one non-array value, or a stream of
    /// concatenated values; the latter two are wrapped so reruns never nest arrays.
    pub fn translate_json_tree(
        &self,
        text: &str,
    ) -> Result<(Value, TranslationStats), CrosswalkError> {
        let mut values = Deserializer::from_str(text)
            .into_iter::<Value>()
            .collect::<Result<Vec<_>, _>>()?;

        let mut stats = TranslationStats::default();
        let mut nodes = match values.len() {
            1 if values[0].is_array() => match values.remove(0) {
                Value::Array(items) => items,
                other => vec![other],
            },
            _ => {
                stats.layout_changed = true;
                values
            }
        };

        let keys = self.label_keys();
        for (index, node) in nodes.iter_mut().enumerate() {
            stats.records += 1;
            self.walk(node, &keys, index + 1, &mut stats)?;
        }
        Ok((Value::Array(nodes), stats))
    }

    fn label_keys(&self) -> Vec<String> {
        if self.options.label_keys.is_empty() {
            vec![self.source().default_column().to_string()]
        } else {
            self.options.label_keys.clone()
        }
    }

    fn walk(
        &self,
        node: &mut Value,
        keys: &[String],
        record: usize,
        stats: &mut TranslationStats,
    ) -> Result<(), CrosswalkError> {
        match node {
            Value::Object(map) => {
                for (key, value) in map.iter_mut() {
                    if keys.iter().any(|wanted| wanted == key) {
                        self.remap_leaf(value, keys, record, stats)?;
                    } else {
                        self.walk(value, keys, record, stats)?;
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, keys, record, stats)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn remap_leaf(
        &self,
        value: &mut Value,
        keys: &[String],
        record: usize,
        stats: &mut TranslationStats,
    ) -> Result<(), CrosswalkError> {
        if let Value::Array(items) = value {
            for item in items.iter_mut() {
                self.remap_leaf(item, keys, record, stats)?;
            }
            return Ok(());
        }
        if value.is_object() {
            return self.walk(value, keys, record, stats);
        }
        let raw = match &*value {
            Value::String(text) => text.clone(),
            Value::Number(number) => number.to_string(),
            _ => return Ok(()),
        };
        let translated = self.translate_or_keep(&raw, record, stats)?;
        *value = self.typed(translated);
        Ok(())
    }

    fn typed(&self, value: String) -> Value {
        if self.target().is_numeric() {
            if let Ok(number) = value.parse::<u64>() {
                return Value::from(number);
            }
        }
        Value::String(value)
    }
}
