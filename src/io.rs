//! JSON text and file persistence.
//!
//! Thin wrappers over `serialize`/`deserialize`. The format is fixed: one
//! JSON object per entity, pretty-printed unless the context config says
//! otherwise.
//!
//! ```text
//! Context ─serialize→ Document ─dumps→ text ─dump→ file
//! file ─load→ text ─loads→ Document ─deserialize→ Context
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::Value as Json;
use tracing::debug;

use crate::config::DecodeOptions;
use crate::context::Context;
use crate::model::EntityId;
use crate::serialize::Document;
use crate::{Error, Result};

impl Context {
    /// Encode `id` as JSON text.
    pub fn dumps(&self, id: &EntityId) -> Result<String> {
        let doc = Json::Object(self.serialize(id)?);
        let text = if self.config.pretty {
            serde_json::to_string_pretty(&doc)?
        } else {
            serde_json::to_string(&doc)?
        };
        Ok(text)
    }

    /// Write the encoded document to `writer`.
    pub fn write_to(&self, id: &EntityId, writer: &mut dyn Write) -> Result<()> {
        let text = self.dumps(id)?;
        writer.write_all(text.as_bytes())?;
        writeln!(writer)?;
        Ok(())
    }

    /// Write `id` to `path`, creating missing parent directories when the
    /// config allows it.
    pub fn dump(&self, id: &EntityId, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.config.create_dirs {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)?;
            }
        }
        let mut file = fs::File::create(path)?;
        self.write_to(id, &mut file)?;
        debug!(target: "entity_graph::io", id = %id, path = %path.display(), "Dumped entity");
        Ok(())
    }

    /// Decode JSON text. The text must hold a single document object.
    pub fn loads(&mut self, text: &str, options: DecodeOptions) -> Result<EntityId> {
        let doc = parse_document(text)?;
        self.deserialize(&doc, options)
    }

    pub fn load(&mut self, path: impl AsRef<Path>, options: DecodeOptions) -> Result<EntityId> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let id = self.loads(&text, options)?;
        debug!(target: "entity_graph::io", id = %id, path = %path.display(), "Loaded entity");
        Ok(id)
    }

    /// Decode options taken from this context's config, relations off.
    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::from(&self.config)
    }
}

fn parse_document(text: &str) -> Result<Document> {
    match serde_json::from_str::<Json>(text)? {
        Json::Object(doc) => Ok(doc),
        other => Err(Error::Document(format!("expected a document object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::Value;
    use crate::Create;

    #[test]
    fn test_dumps_respects_pretty() {
        let mut ctx = Context::with_config(Config::default().pretty(false));
        let id = ctx.create_with("GenericInt", Create::new().id("n").data(3)).unwrap();
        assert_eq!(
            ctx.dumps(&id).unwrap(),
            r#"{"class":"GenericInt","type":"Type","id":"n","data":3}"#
        );
    }

    #[test]
    fn test_loads_rejects_non_object() {
        let mut ctx = Context::new();
        assert!(matches!(ctx.loads("[1, 2]", DecodeOptions::new()), Err(Error::Document(_))));
        assert!(matches!(ctx.loads("{not json", DecodeOptions::new()), Err(Error::Json(_))));
    }

    #[test]
    fn test_write_to_buffer_then_loads() {
        let mut ctx = Context::new();
        let id = ctx.create_with("GenericStr", Create::new().data("hello")).unwrap();
        let mut buffer = Vec::new();
        ctx.write_to(&id, &mut buffer).unwrap();
        ctx.delete(&id).unwrap();

        let text = String::from_utf8(buffer).unwrap();
        let back = ctx.loads(&text, DecodeOptions::new()).unwrap();
        assert_eq!(back, id);
        assert_eq!(ctx.get_data(&back).unwrap(), Value::from("hello"));
    }
}
