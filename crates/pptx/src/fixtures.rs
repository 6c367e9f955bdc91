//! Minimal in-memory decks for tests.

use crate::deck::{local_name, Deck};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::ZipWriter;

const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";

/// A slide with one text box per entry.
pub(crate) fn slide_xml(texts: &[&str]) -> String {
    let shapes: String = texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let id = i + 2;
            format!(
                r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="100" cy="100"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:p><a:r><a:rPr lang="en-US"/><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp>"#,
                escape(*text)
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#
    )
}

/// Deck bytes with slides listed in natural order.
pub(crate) fn deck_bytes(slides: &[String]) -> Vec<u8> {
    let order: Vec<usize> = (0..slides.len()).collect();
    deck_bytes_ordered(slides, &order)
}

/// Deck bytes where `order` lists slide indices in presentation order.
///
/// Slide `i` is stored as `ppt/slides/slide{i+1}.xml` with relationship
/// id `rId{i+2}`, and each slide has a layout relationship `rId1`.
pub(crate) fn deck_bytes_ordered(slides: &[String], order: &[usize]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();

    let overrides: String = (1..=slides.len())
        .map(|n| {
            format!(r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="{SLIDE_CONTENT_TYPE}"/>"#)
        })
        .collect();
    let content_types = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>{overrides}</Types>"#
    );

    let slide_ids: String = order
        .iter()
        .enumerate()
        .map(|(pos, i)| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + pos, i + 2))
        .collect();
    let presentation = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#
    );

    let slide_rels: String = (0..slides.len())
        .map(|i| {
            format!(
                r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{}.xml"/>"#,
                i + 2,
                i + 1
            )
        })
        .collect();
    let presentation_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>{slide_rels}</Relationships>"#
    );

    let mut parts = vec![
        ("[Content_Types].xml".to_string(), content_types),
        (
            "_rels/.rels".to_string(),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#.to_string(),
        ),
        ("ppt/presentation.xml".to_string(), presentation),
        ("ppt/_rels/presentation.xml.rels".to_string(), presentation_rels),
    ];
    for (i, slide) in slides.iter().enumerate() {
        parts.push((format!("ppt/slides/slide{}.xml", i + 1), slide.clone()));
        parts.push((
            format!("ppt/slides/_rels/slide{}.xml.rels", i + 1),
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/></Relationships>"#.to_string(),
        ));
    }

    for (name, content) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// A loaded deck with slides in natural order.
pub(crate) fn deck(slides: &[String]) -> Deck {
    Deck::from_reader(Cursor::new(deck_bytes(slides))).unwrap()
}

/// Text of every `a:t` element, in document order.
pub(crate) fn slide_texts(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    let mut texts = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event().unwrap() {
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"t" => {
                current = Some(String::new());
            }
            Event::Text(ref e) => {
                if let Some(text) = current.as_mut() {
                    text.push_str(&e.unescape().unwrap());
                }
            }
            Event::End(ref e) if local_name(e.name().as_ref()) == b"t" => {
                texts.extend(current.take());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    texts
}
