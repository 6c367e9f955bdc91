//! Trend arrow images placed on a designated slide.
//!
//! Each of the KPIs `img_1` to `img_4` picks an ascending, descending or
//! stable image by sign; the image is added as a new picture at that slot's
//! fixed position. Existing pictures are left alone.

use crate::deck::{
    local_name, parse_relationships, part_dir, relative_target, rels_path, Deck, CONTENT_TYPES_PART,
};
use kpi_core::{Error, KpiMap, Result, TrendDirection, TrendImagesConfig};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// KPI keys driving the four image slots, in slot order.
pub const TREND_KPI_KEYS: [&str; 4] = ["img_1", "img_2", "img_3", "img_4"];

/// English Metric Units per point.
const EMU_PER_POINT: f64 = 12700.0;

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const REL_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const EMPTY_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#;

/// One image placed by the injector.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedImage {
    pub key: &'static str,
    pub direction: TrendDirection,
    /// Top-left corner in points.
    pub position: (f64, f64),
    /// Media part holding the image.
    pub media_part: String,
    /// Relationship id referenced by the picture.
    pub rel_id: String,
}

/// Adds trend images to one slide of a deck.
pub struct TrendImageInjector<'a> {
    images: &'a TrendImagesConfig,
    images_dir: PathBuf,
}

impl<'a> TrendImageInjector<'a> {
    /// Create an injector reading image files from `images_dir`.
    pub fn new(images: &'a TrendImagesConfig, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images,
            images_dir: images_dir.into(),
        }
    }

    /// Place the four trend images on the configured slide.
    pub fn inject(&self, deck: &mut Deck, kpis: &KpiMap) -> Result<Vec<PlacedImage>> {
        let placement = &self.images.placement;
        let slide_path = deck
            .slide_paths()
            .get(placement.slide_index)
            .cloned()
            .ok_or_else(|| {
                Error::TemplateLoadError(format!(
                    "Trend images target slide position {} but the deck has {} slides",
                    placement.slide_index,
                    deck.slide_count()
                ))
            })?;

        let slide_rels_path = rels_path(&slide_path);
        let mut rels_xml = if deck.has_part(&slide_rels_path) {
            deck.part_str(&slide_rels_path)?
        } else {
            EMPTY_RELS.to_string()
        };
        let mut next_rel = next_rel_number(&rels_xml)?;

        let mut media: HashMap<TrendDirection, (String, String)> = HashMap::new();
        let mut placed = Vec::with_capacity(TREND_KPI_KEYS.len());

        for (key, position) in TREND_KPI_KEYS.into_iter().zip(placement.positions.iter()) {
            let value = kpis.get(key);
            if value.is_none() {
                log::warn!("Trend KPI '{}' not found; using the stable image", key);
            }
            let direction = TrendDirection::from_value(value);

            if !media.contains_key(&direction) {
                let media_part = self.add_media(deck, direction)?;
                let rel_id = format!("rId{}", next_rel);
                next_rel += 1;
                let target = relative_target(part_dir(&slide_path), &media_part);
                rels_xml = insert_before_close(
                    &rels_xml,
                    "Relationships",
                    &format!(
                        r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
                        rel_id, IMAGE_REL_TYPE, target
                    ),
                )?;
                media.insert(direction, (media_part, rel_id));
            }

            let (media_part, rel_id) = &media[&direction];
            log::debug!(
                "Placing {} image for {} at ({}, {})",
                direction.as_str(),
                key,
                position.0,
                position.1
            );
            placed.push(PlacedImage {
                key,
                direction,
                position: *position,
                media_part: media_part.clone(),
                rel_id: rel_id.clone(),
            });
        }

        let slide_xml = deck.part_str(&slide_path)?;
        let slide_xml = append_pictures(&slide_xml, &placed, placement.size)?;
        deck.set_part(&slide_path, slide_xml.into_bytes());
        deck.set_part(&slide_rels_path, rels_xml.into_bytes());

        Ok(placed)
    }

    /// Store the image for a direction in the deck and register its type.
    fn add_media(&self, deck: &mut Deck, direction: TrendDirection) -> Result<String> {
        let file_name = self.images.file_for(direction);
        let path = self.images_dir.join(file_name);
        let extension = image_extension(&path)?;
        let content_type = content_type_for(&extension).ok_or_else(|| {
            Error::ImageLoadError(format!(
                "Unsupported image type '{}' for '{}'",
                extension,
                path.display()
            ))
        })?;

        let data = std::fs::read(&path)
            .map_err(|e| Error::ImageLoadError(format!("Failed to read '{}': {}", path.display(), e)))?;

        let media_part = format!("ppt/media/kpi_trend_{}.{}", direction.as_str(), extension);
        deck.set_part(&media_part, data);
        ensure_default_content_type(deck, &extension, content_type)?;
        Ok(media_part)
    }
}

fn image_extension(path: &Path) -> Result<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| {
            Error::ImageLoadError(format!("Image '{}' has no file extension", path.display()))
        })
}

fn content_type_for(extension: &str) -> Option<&'static str> {
    match extension {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

/// Add a `Default` content type for an extension unless one exists.
fn ensure_default_content_type(deck: &mut Deck, extension: &str, content_type: &str) -> Result<()> {
    let xml = deck.part_str(CONTENT_TYPES_PART)?;

    let mut reader = Reader::from_str(&xml);
    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"Default" => {
                let registered = e.attributes().flatten().any(|a| {
                    a.key.as_ref() == b"Extension"
                        && String::from_utf8_lossy(&a.value).eq_ignore_ascii_case(extension)
                });
                if registered {
                    return Ok(());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::TemplateLoadError(format!(
                    "Error parsing content types: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    let updated = insert_before_close(
        &xml,
        "Types",
        &format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            extension, content_type
        ),
    )?;
    deck.set_part(CONTENT_TYPES_PART, updated.into_bytes());
    Ok(())
}

/// Next free `rIdN` number in a relationships part.
fn next_rel_number(rels_xml: &str) -> Result<u32> {
    let max = parse_relationships(rels_xml)?
        .iter()
        .filter_map(|r| r.id.strip_prefix("rId").and_then(|n| n.parse::<u32>().ok()))
        .max()
        .unwrap_or(0);
    Ok(max + 1)
}

/// Insert `fragment` just before the last closing tag whose local name is
/// `element`.
fn insert_before_close(xml: &str, element: &str, fragment: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut insert_at = None;

    loop {
        match reader.read_event() {
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == element.as_bytes() => {
                // The reader stops right after `>`; the tag starts at the last `</`.
                let end = reader.buffer_position();
                insert_at = xml[..end].rfind("</");
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::TemplateLoadError(format!(
                    "Error parsing XML while looking for </{}>: {}",
                    element, e
                )));
            }
            _ => {}
        }
    }

    let at = insert_at.ok_or_else(|| {
        Error::TemplateLoadError(format!("No closing </{}> element found", element))
    })?;

    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    Ok(out)
}

/// Largest `cNvPr` shape id in a slide.
fn max_shape_id(slide_xml: &str) -> Result<u32> {
    let mut reader = Reader::from_str(slide_xml);
    let mut max = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"cNvPr" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"id" {
                        if let Ok(id) = String::from_utf8_lossy(&attr.value).parse::<u32>() {
                            max = max.max(id);
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::TemplateLoadError(format!("Error parsing slide: {}", e)));
            }
            _ => {}
        }
    }

    Ok(max)
}

fn to_emu(points: f64) -> i64 {
    (points * EMU_PER_POINT).round() as i64
}

/// Append one `p:pic` per placed image to the slide's shape tree.
fn append_pictures(slide_xml: &str, placed: &[PlacedImage], size: (f64, f64)) -> Result<String> {
    let mut next_id = max_shape_id(slide_xml)? + 1;
    let (cx, cy) = (to_emu(size.0), to_emu(size.1));

    let mut pictures = String::new();
    for image in placed {
        pictures.push_str(&format!(
            concat!(
                r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="KPI Trend {key}"/>"#,
                r#"<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#,
                r#"<p:blipFill><a:blip xmlns:r="{ns}" r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>"#,
                r#"<p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#
            ),
            id = next_id,
            key = image.key,
            ns = REL_NAMESPACE,
            rel = image.rel_id,
            x = to_emu(image.position.0),
            y = to_emu(image.position.1),
            cx = cx,
            cy = cy,
        ));
        next_id += 1;
    }

    insert_before_close(slide_xml, "spTree", &pictures).map_err(|_| {
        Error::TemplateLoadError("Target slide has no shape tree (p:spTree)".to_string())
    })
}
