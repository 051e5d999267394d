//! Declare-once-per-stream converter cache
//!
//! A stream carries its frame declaration on the first message only. The
//! cache captures it, builds the converter once and hands it out for every
//! following message. Without any declaration the cache stays empty and
//! callers use the identity field mapping.

use arsync_core::ArResult;

use crate::{FrameDeclaration, TransformConverter};

/// Per-stream holder of the declared source frame
#[derive(Debug, Clone)]
pub struct ConverterCache {
    target: FrameDeclaration,
    converter: Option<TransformConverter>,
    redeclarations: u32,
}

impl ConverterCache {
    /// Cache converting into engine space
    pub fn new() -> Self {
        Self::with_target(FrameDeclaration::ENGINE)
    }

    pub fn with_target(target: FrameDeclaration) -> Self {
        ConverterCache {
            target,
            converter: None,
            redeclarations: 0,
        }
    }

    /// Feed the declaration carried by a message, if any
    ///
    /// The first declaration builds the converter. A different declaration
    /// later on the same stream replaces it (last one wins) and is logged.
    /// An invalid declaration is rejected and the current converter kept.
    pub fn observe(&mut self, declaration: Option<&FrameDeclaration>) -> ArResult<()> {
        let Some(declaration) = declaration else {
            return Ok(());
        };

        if let Some(current) = &self.converter {
            if current.source() == declaration {
                return Ok(());
            }
        }

        let converter = TransformConverter::new(*declaration, self.target)?;
        if let Some(previous) = self.converter.replace(converter) {
            self.redeclarations += 1;
            tracing::warn!(
                previous = ?previous.source(),
                current = ?declaration,
                "coordinate frame re-declared mid-stream, last declaration wins"
            );
        }
        Ok(())
    }

    /// Converter for the current stream, `None` means identity mapping
    pub fn converter(&self) -> Option<&TransformConverter> {
        self.converter.as_ref()
    }

    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }

    /// Number of times the declaration changed after the first one
    pub fn redeclarations(&self) -> u32 {
        self.redeclarations
    }

    /// Forget the declaration, e.g. when the stream restarts
    pub fn reset(&mut self) {
        self.converter = None;
        self.redeclarations = 0;
    }
}

impl Default for ConverterCache {
    fn default() -> Self {
        Self::new()
    }
}
