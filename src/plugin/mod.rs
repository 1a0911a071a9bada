//! Format families: bulk registration of validators and converters.
//!
//! A family groups the formats of one semantic type. Each format knows how to
//! recognise its data and, optionally, how to read it into a common in-memory
//! representation and write it back out. Registering a family derives one
//! converter per ordered pair of distinct formats where the first can be read
//! and the second written, by running the reader and then the writer.

mod builtin;

use crate::convert::ConversionGraph;
use crate::error::ConversionError;
use crate::extract::SpecExtractor;

/// One format of a [`FormatFamily`].
///
/// All three scripts are ordinary task scripts. The validator produces a
/// boolean `Output` from its single wrapped input. The reader binds the
/// decoded data to the variable `data`, which the writer then turns into its
/// single `Output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCodec {
    pub format: String,
    pub validator: String,
    pub read: Option<String>,
    pub write: Option<String>,
}

impl FormatCodec {
    pub fn new(format: impl Into<String>, validator: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            validator: validator.into(),
            read: None,
            write: None,
        }
    }

    pub fn with_reader(mut self, script: impl Into<String>) -> Self {
        self.read = Some(script.into());
        self
    }

    pub fn with_writer(mut self, script: impl Into<String>) -> Self {
        self.write = Some(script.into());
        self
    }
}

/// The formats of a single semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatFamily {
    pub kind: String,
    pub formats: Vec<FormatCodec>,
}

impl FormatFamily {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            formats: Vec::new(),
        }
    }

    pub fn with_format(mut self, codec: FormatCodec) -> Self {
        self.formats.push(codec);
        self
    }
}

impl ConversionGraph {
    /// Registers a validator for every format of `family`, then a converter
    /// for every readable/writable pair of them.
    pub fn register_family(&mut self, family: &FormatFamily) -> Result<(), ConversionError> {
        let kind = family.kind.as_str();
        let extractor = SpecExtractor::new().with_vocabulary(self.factory().vocabulary().clone());

        for codec in &family.formats {
            let name = format!("{kind}.{}", codec.format);
            let validator = extractor.extract_spec(&name, &codec.validator)?;
            self.add_validator_node(kind, &codec.format, &validator)?;
        }

        for source in &family.formats {
            let Some(read) = &source.read else {
                continue;
            };

            for target in &family.formats {
                let Some(write) = &target.write else {
                    continue;
                };
                if source.format == target.format {
                    continue;
                }

                let name = format!("{kind}.{} -> {kind}.{}", source.format, target.format);
                let converter = extractor.extract_spec(&name, &format!("{read}\n{write}"))?;
                self.add_converter_edge(kind, &source.format, &target.format, &converter)?;
            }
        }

        tracing::info!(kind, formats = family.formats.len(), "registered format family");
        Ok(())
    }

    /// Registers the `number`, `string`, `boolean` and `geo` families.
    pub fn with_builtin_formats(mut self) -> Result<Self, ConversionError> {
        for family in builtin::families() {
            self.register_family(&family)?;
        }
        Ok(self)
    }
}
