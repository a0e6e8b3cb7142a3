//! Console target writing pretty-printed JSON documents.

use std::io::{self, Write};
use tracing::warn;

use crate::collector::Target;
use crate::document::Document;

/// Pretty JSON, one document after another.
pub struct Console<W: Write> {
    name: String,
    out: W,
}

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new("Console", io::stdout())
    }
}

impl Console<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new("Console stderr", io::stderr())
    }
}

impl<W: Write> Console<W> {
    pub fn new(name: &str, out: W) -> Self {
        Self {
            name: name.to_string(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_doc(&mut self, doc: &Document) -> io::Result<()> {
        let text = serde_json::to_string_pretty(&doc.render())?;
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }
}

impl<W: Write> Target for Console<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&mut self, doc: &Document) {
        if let Err(e) = self.write_doc(doc) {
            warn!("{}: dropping document {}: {}", self.name, doc.id, e);
        }
    }
}
