//! In-memory PPTX deck: every archive part plus the resolved slide order.

use kpi_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub(crate) const PRESENTATION_PART: &str = "ppt/presentation.xml";
pub(crate) const PRESENTATION_RELS_PART: &str = "ppt/_rels/presentation.xml.rels";
pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const SLIDE_REL_TYPE: &str = "/relationships/slide";

/// A loaded deck template.
///
/// Parts are kept in archive order so the written file mirrors the template.
#[derive(Debug, Clone)]
pub struct Deck {
    parts: Vec<(String, Vec<u8>)>,
    slides: Vec<String>,
}

impl Deck {
    /// Open a deck from a file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::TemplateLoadError(format!("Failed to open '{}': {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a deck from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::TemplateLoadError(format!("Failed to open ZIP: {}", e)))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| Error::TemplateLoadError(format!("Failed to read entry {}: {}", i, e)))?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).map_err(|e| {
                Error::TemplateLoadError(format!("Failed to read '{}': {}", file.name(), e))
            })?;
            parts.push((file.name().to_string(), data));
        }

        let mut deck = Self {
            parts,
            slides: Vec::new(),
        };
        deck.slides = deck.resolve_slide_order()?;
        log::debug!("Loaded deck with {} parts, {} slides", deck.parts.len(), deck.slides.len());
        Ok(deck)
    }

    /// Slide part paths in presentation order.
    pub fn slide_paths(&self) -> &[String] {
        &self.slides
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Raw bytes of a part.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.part(name).is_some()
    }

    /// A part decoded as UTF-8 text.
    pub fn part_str(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| Error::TemplateLoadError(format!("Part not found in deck: '{}'", name)))?;
        String::from_utf8(data.to_vec())
            .map_err(|e| Error::TemplateLoadError(format!("Part '{}' is not UTF-8: {}", name, e)))
    }

    /// Replace a part, or append it if it does not exist yet.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.parts.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data,
            None => self.parts.push((name.to_string(), data)),
        }
    }

    /// Serialize the deck as a ZIP archive.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W> {
        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| Error::WriteError(format!("Failed to start '{}': {}", name, e)))?;
            zip.write_all(data)
                .map_err(|e| Error::WriteError(format!("Failed to write '{}': {}", name, e)))?;
        }

        zip.finish()
            .map_err(|e| Error::WriteError(format!("Failed to finish archive: {}", e)))
    }

    /// Write the deck to `path`.
    ///
    /// The archive goes to a temporary file next to `path` and is renamed
    /// into place only once complete.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            Error::WriteError(format!("Failed to create temporary file in '{}': {}", dir.display(), e))
        })?;

        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            self.write_to(&mut writer)?;
            writer
                .flush()
                .map_err(|e| Error::WriteError(format!("Failed to flush output: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::WriteError(format!("Failed to sync output: {}", e)))?;

        temp.persist(path).map_err(|e| {
            Error::WriteError(format!("Failed to move output to '{}': {}", path.display(), e.error))
        })?;
        Ok(())
    }

    /// Slide order from `p:sldIdLst`, resolved through the presentation
    /// relationships.
    fn resolve_slide_order(&self) -> Result<Vec<String>> {
        let rels = parse_relationships(&self.part_str(PRESENTATION_RELS_PART)?)?;
        let targets: HashMap<&str, &str> = rels
            .iter()
            .filter(|r| r.rel_type.ends_with(SLIDE_REL_TYPE))
            .map(|r| (r.id.as_str(), r.target.as_str()))
            .collect();

        let presentation = self.part_str(PRESENTATION_PART)?;
        let mut reader = Reader::from_str(&presentation);
        reader.trim_text(true);

        let mut slides = Vec::new();
        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                    if local_name(e.name().as_ref()) == b"sldId" =>
                {
                    // The relationship id is the namespaced `r:id`; plain `id` is the slide id.
                    let rel_id = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.as_ref().contains(&b':') && local_name(a.key.as_ref()) == b"id")
                        .map(|a| String::from_utf8_lossy(&a.value).to_string())
                        .ok_or_else(|| {
                            Error::TemplateLoadError("Slide entry without relationship id".to_string())
                        })?;

                    let target = targets.get(rel_id.as_str()).ok_or_else(|| {
                        Error::TemplateLoadError(format!("Slide relationship '{}' not found", rel_id))
                    })?;
                    slides.push(resolve_target("ppt", target));
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::TemplateLoadError(format!(
                        "Error parsing presentation: {}",
                        e
                    )));
                }
                _ => {}
            }
        }

        for slide in &slides {
            if !self.has_part(slide) {
                return Err(Error::TemplateLoadError(format!("Slide part missing: '{}'", slide)));
            }
        }

        Ok(slides)
    }
}

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

/// Parse the relationships of a `.rels` part.
pub(crate) fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut rels = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"Relationship" => {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                };

                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).to_string();
                    match attr.key.as_ref() {
                        b"Type" => rel.rel_type = value,
                        b"Target" => rel.target = value,
                        b"Id" => rel.id = value,
                        _ => {}
                    }
                }
                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::TemplateLoadError(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Resolve a relationship target against the directory of its source part.
pub(crate) fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Path of a target part relative to the directory of a source part.
pub(crate) fn relative_target(base_dir: &str, part: &str) -> String {
    let base: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    let target: Vec<&str> = part.split('/').filter(|s| !s.is_empty()).collect();

    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<&str> = vec![".."; base.len() - common];
    segments.extend(&target[common..]);
    segments.join("/")
}

/// Directory of a part path (`ppt/slides/slide1.xml` → `ppt/slides`).
pub(crate) fn part_dir(part: &str) -> &str {
    part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Relationship part of a part (`ppt/slides/slide1.xml` →
/// `ppt/slides/_rels/slide1.xml.rels`).
pub(crate) fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}
