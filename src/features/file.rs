//! Feature vector file with cross-validation against the unit table.
//!
//! Utterances are appended in unit-table order. For each one the writer
//! checks the local schema, requires an edge unit before the synthetic
//! start vector, a real unit for every feature line, and an edge unit
//! before the synthetic end vector. Any violation aborts the stage.

use crate::binio::{capacity_for, count_u32, read_u32, write_u32};
use crate::error::{Result, VoicebankError};
use crate::features::halfphone;
use crate::features::schema::FeatureSchema;
use crate::features::vector::{EdgeMarker, FeatureVector};
use crate::header::{self, ContentType};
use crate::units::UnitEntry;
use crate::verify;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

pub struct FeatureFileWriter<W: Write + Seek> {
    writer: W,
    schema: FeatureSchema,
    /// Schema utterance dumps are compared against.
    source_schema: FeatureSchema,
    halfphone: bool,
    count_pos: u64,
    count: usize,
}

impl FeatureFileWriter<BufWriter<File>> {
    pub fn create(path: &Path, source_schema: FeatureSchema, halfphone: bool) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), source_schema, halfphone)
    }
}

impl<W: Write + Seek> FeatureFileWriter<W> {
    /// `source_schema` is the phone-level schema of the dumps. In
    /// half-phone mode the file stores its half-phone extension.
    pub fn new(mut writer: W, source_schema: FeatureSchema, halfphone: bool) -> Result<Self> {
        source_schema.edge_index()?;
        let (schema, content_type) = if halfphone {
            (
                halfphone::extend_schema(&source_schema)?,
                ContentType::HalfphoneUnitFeatures,
            )
        } else {
            (source_schema.clone(), ContentType::UnitFeatures)
        };

        let mut pos = header::write(&mut writer, content_type)?;
        let text = schema.to_text();
        writer.write_all(text.as_bytes())?;
        pos += text.len() as u64;
        write_u32(&mut writer, 0)?;

        Ok(Self {
            writer,
            schema,
            source_schema,
            halfphone,
            count_pos: pos,
            count: 0,
        })
    }

    /// Appends one utterance's vectors, checking them against `units`.
    ///
    /// `vectors` are phone-level; in half-phone mode each one is split in two.
    pub fn append_utterance(
        &mut self,
        utterance: &str,
        local_schema: &FeatureSchema,
        vectors: &[FeatureVector],
        units: &[UnitEntry],
    ) -> Result<()> {
        verify::check_schema(utterance, &self.source_schema, local_schema)?;

        verify::expect_edge(units, self.count, utterance)?;
        self.push(&FeatureVector::Edge(EdgeMarker::Start))?;

        for vector in vectors {
            let FeatureVector::Real(values) = vector else {
                return Err(VoicebankError::alignment(
                    utterance,
                    self.count,
                    "feature dump holds an edge vector",
                ));
            };
            if self.halfphone {
                for half in halfphone::split(&self.schema, values)? {
                    verify::expect_real(units, self.count, utterance)?;
                    self.push(&half)?;
                }
            } else {
                verify::expect_real(units, self.count, utterance)?;
                self.push(vector)?;
            }
        }

        verify::expect_edge(units, self.count, utterance).map_err(|e| match e {
            VoicebankError::Alignment { .. } => VoicebankError::alignment(
                utterance,
                self.count,
                "unit table has more units than the feature dump has lines",
            ),
            other => other,
        })?;
        self.push(&FeatureVector::Edge(EdgeMarker::End))?;

        debug!(utterance, vectors = vectors.len(), "Features appended");
        Ok(())
    }

    /// Appends one vector without unit-table checks.
    pub fn push(&mut self, vector: &FeatureVector) -> Result<()> {
        vector.write_to(&self.schema, &mut self.writer)?;
        self.count += 1;
        Ok(())
    }

    /// Patches the vector count and flushes. Returns the number of vectors.
    pub fn close(mut self) -> Result<usize> {
        let count = count_u32(self.count, "feature vector")?;
        self.writer.seek(SeekFrom::Start(self.count_pos))?;
        write_u32(&mut self.writer, count)?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        Ok(self.count)
    }
}

/// Fully loaded feature vector file.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFile {
    pub content_type: ContentType,
    pub schema: FeatureSchema,
    pub vectors: Vec<FeatureVector>,
}

impl FeatureFile {
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(&mut BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let content_type = header::read(reader)?;
        if !matches!(
            content_type,
            ContentType::UnitFeatures | ContentType::HalfphoneUnitFeatures
        ) {
            return Err(VoicebankError::WrongContentType {
                expected: ContentType::UnitFeatures.to_string(),
                actual: content_type.to_string(),
            });
        }
        let schema = FeatureSchema::read_from(reader)?;
        if content_type == ContentType::HalfphoneUnitFeatures {
            schema.halfphone_index()?;
        }
        let count = read_u32(reader)?;
        let mut vectors = Vec::with_capacity(capacity_for(count as usize));
        for _ in 0..count {
            vectors.push(FeatureVector::read_from(&schema, reader)?);
        }
        Ok(Self {
            content_type,
            schema,
            vectors,
        })
    }

    pub fn is_halfphone(&self) -> bool {
        self.content_type == ContentType::HalfphoneUnitFeatures
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
