//! Applying a substitution plan to slide XML.

use crate::deck::Deck;
use kpi_core::{Error, KeyMatching, Result, SubstitutionPlan, SubstitutionScope};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;

/// Rewrite every slide of the deck with the plan.
///
/// Returns the total number of replacements made.
pub fn substitute_slides(deck: &mut Deck, plan: &SubstitutionPlan, scope: SubstitutionScope) -> Result<usize> {
    let mut total = 0;

    for (idx, path) in deck.slide_paths().to_vec().iter().enumerate() {
        let xml = deck.part_str(path)?;
        let (rewritten, count) = match scope {
            SubstitutionScope::Text => rewrite_text_nodes(&xml, plan),
            SubstitutionScope::Document => rewrite_document(&xml, plan),
        }
        .map_err(|e| match e {
            Error::SubstitutionError(msg) => {
                Error::SubstitutionError(format!("Slide {} ({}): {}", idx + 1, path, msg))
            }
            other => other,
        })?;

        log::debug!("Slide {}: {} replacements", idx + 1, count);
        if count > 0 {
            deck.set_part(path, rewritten.into_bytes());
            total += count;
        }
    }

    Ok(total)
}

/// Apply the plan inside each text node, leaving markup untouched.
///
/// A placeholder split across two runs (`{{re` / `v}}`) is not matched.
pub fn rewrite_text_nodes(xml: &str, plan: &SubstitutionPlan) -> Result<(String, usize)> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut replaced = 0;

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Text(text)) => {
                let raw = text.unescape().map_err(|e| {
                    Error::SubstitutionError(format!(
                        "Bad text near byte {}: {}",
                        reader.buffer_position(),
                        e
                    ))
                })?;
                let (new_text, count) = plan.apply(&raw);
                if count == 0 {
                    Event::Text(text)
                } else {
                    replaced += count;
                    Event::Text(BytesText::new(&new_text).into_owned())
                }
            }
            Ok(event) => event,
            Err(e) => {
                return Err(Error::SubstitutionError(format!(
                    "Malformed slide XML near byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        };

        writer
            .write_event(event)
            .map_err(|e| Error::SubstitutionError(format!("Failed to write slide XML: {}", e)))?;
    }

    if replaced == 0 {
        return Ok((xml.to_string(), 0));
    }

    let output = String::from_utf8(writer.into_inner())
        .map_err(|e| Error::SubstitutionError(format!("Rewritten slide is not UTF-8: {}", e)))?;
    Ok((output, replaced))
}

/// Apply the plan over the whole serialized slide, then re-parse it.
///
/// Replacement text is XML-escaped, but keys can still match inside tag
/// names and attribute values; a result that is no longer well-formed is a
/// [`Error::SubstitutionError`].
///
/// Literal keys containing `&`, `<` or `>` are matched in escaped form
/// (`R&D` matches `R&amp;D`). Pattern keys run against the raw markup, so
/// they must spell out entity references themselves.
pub fn rewrite_document(xml: &str, plan: &SubstitutionPlan) -> Result<(String, usize)> {
    let mut current = xml.to_string();
    let mut replaced = 0;

    for replacement in plan.replacements() {
        // Literal keys are matched in their escaped form, as they appear in
        // text nodes.
        let markup_key;
        let replacement = match (replacement.matching(), partial_escape(&replacement.key)) {
            (KeyMatching::Literal, Cow::Owned(escaped)) => {
                markup_key = replacement.rekeyed(&escaped)?;
                &markup_key
            }
            _ => replacement,
        };

        let count = replacement.count_in(&current);
        if count == 0 {
            continue;
        }
        replaced += count;
        let text = escape(&replacement.text);
        current = replacement.replace_with(&current, &text).into_owned();
    }

    if replaced > 0 {
        check_well_formed(&current)?;
    }
    Ok((current, replaced))
}

/// Fail unless `xml` parses completely with balanced elements.
pub fn check_well_formed(xml: &str) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    let mut depth: usize = 0;
    let mut roots = 0;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                check_attributes(&e)?;
                if depth == 0 {
                    roots += 1;
                }
                depth += 1;
            }
            Ok(Event::End(_)) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    Error::SubstitutionError("Unexpected closing tag".to_string())
                })?;
            }
            Ok(Event::Empty(e)) => {
                check_attributes(&e)?;
                if depth == 0 {
                    roots += 1;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(Error::SubstitutionError(format!(
                    "Slide XML is malformed after substitution, near byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }

    if depth != 0 {
        return Err(Error::SubstitutionError(format!(
            "Slide XML has {} unclosed element(s) after substitution",
            depth
        )));
    }
    if roots != 1 {
        return Err(Error::SubstitutionError(format!(
            "Slide XML has {} root elements after substitution",
            roots
        )));
    }
    Ok(())
}

/// Fail on a malformed or duplicated attribute.
fn check_attributes(e: &BytesStart) -> Result<()> {
    for attr in e.attributes() {
        attr.map_err(|err| {
            Error::SubstitutionError(format!(
                "Slide XML has a bad attribute in <{}> after substitution: {}",
                String::from_utf8_lossy(e.name().as_ref()),
                err
            ))
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use kpi_core::{KeyMatching, KpiMap, KpiValue, SubstitutionOptions};

    fn plan(entries: Vec<(&str, KpiValue)>) -> SubstitutionPlan {
        let kpis: KpiMap = entries.into_iter().collect();
        SubstitutionPlan::build(&kpis, &SubstitutionOptions::default(), true).unwrap()
    }

    #[test]
    fn test_text_nodes_replaced() {
        let xml = fixtures::slide_xml(&["Revenue: {{rev}}", "Growth: {{growth}}"]);
        let plan = plan(vec![
            ("{{rev}}", KpiValue::Number(1000.0)),
            ("tv{{growth}}", KpiValue::Number(-3.14159)),
        ]);

        let (out, count) = rewrite_text_nodes(&xml, &plan).unwrap();

        assert_eq!(count, 2);
        assert_eq!(fixtures::slide_texts(&out), vec!["Revenue: 1000", "Growth: -3.1"]);
    }

    #[test]
    fn test_text_nodes_preserve_markup() {
        // "sp" and "cNvPr" occur only in markup.
        let xml = fixtures::slide_xml(&["no placeholders here"]);
        let plan = plan(vec![("sp", KpiValue::from("BROKEN")), ("cNvPr", KpiValue::from("X"))]);

        let (out, count) = rewrite_text_nodes(&xml, &plan).unwrap();

        assert_eq!(count, 0);
        assert_eq!(out, xml);
    }

    #[test]
    fn test_text_nodes_escape_replacement() {
        let xml = fixtures::slide_xml(&["{{label}}"]);
        let plan = plan(vec![("{{label}}", KpiValue::from("R&D <core>"))]);

        let (out, _) = rewrite_text_nodes(&xml, &plan).unwrap();

        check_well_formed(&out).unwrap();
        assert_eq!(fixtures::slide_texts(&out), vec!["R&D <core>"]);
    }

    #[test]
    fn test_text_nodes_match_escaped_source_text() {
        let xml = fixtures::slide_xml(&["A&B"]);
        let plan = plan(vec![("A&B", KpiValue::from("ok"))]);

        let (out, count) = rewrite_text_nodes(&xml, &plan).unwrap();

        assert_eq!(count, 1);
        assert_eq!(fixtures::slide_texts(&out), vec!["ok"]);
    }

    #[test]
    fn test_no_residual_keys_after_substitution() {
        let xml = fixtures::slide_xml(&["{{a}} and {{b}}", "{{b}}{{a}}", "tail {{c}}"]);
        let plan = plan(vec![
            ("{{a}}", KpiValue::Number(1.0)),
            ("{{b}}", KpiValue::from("two")),
            ("{{c}}", KpiValue::Absent),
        ]);

        let (out, _) = rewrite_text_nodes(&xml, &plan).unwrap();

        for key in ["{{a}}", "{{b}}", "{{c}}"] {
            assert!(!out.contains(key), "{} left in slide", key);
        }
        assert_eq!(fixtures::slide_texts(&out), vec!["1 and two", "two1", "tail "]);
    }

    #[test]
    fn test_document_scope_replaces_whole_blob() {
        let xml = fixtures::slide_xml(&["Revenue: {{rev}}"]);
        let plan = plan(vec![("{{rev}}", KpiValue::from("<1000>"))]);

        let (out, count) = rewrite_document(&xml, &plan).unwrap();

        assert_eq!(count, 1);
        assert_eq!(fixtures::slide_texts(&out), vec!["Revenue: <1000>"]);
    }

    #[test]
    fn test_document_scope_rejects_broken_markup() {
        let xml = fixtures::slide_xml(&["text"]);
        let kpis: KpiMap = vec![("</a:t>", KpiValue::from("x"))].into_iter().collect();
        let options = SubstitutionOptions {
            key_matching: KeyMatching::Literal,
            ..SubstitutionOptions::default()
        };
        let plan = SubstitutionPlan::build(&kpis, &options, true).unwrap();

        let err = rewrite_document(&xml, &plan).unwrap_err();

        assert!(matches!(err, Error::SubstitutionError(_)));
    }

    #[test]
    fn test_document_scope_rejects_valueless_attribute() {
        let xml = fixtures::slide_xml(&["text"]);
        let plan = plan(vec![("txBox", KpiValue::from("a b"))]);

        let err = rewrite_document(&xml, &plan).unwrap_err();

        assert!(matches!(err, Error::SubstitutionError(_)));
    }

    #[test]
    fn test_document_scope_rejects_duplicate_attribute() {
        let xml = fixtures::slide_xml(&["text"]);
        let plan = plan(vec![("name=", KpiValue::from("id="))]);

        let err = rewrite_document(&xml, &plan).unwrap_err();

        assert!(matches!(err, Error::SubstitutionError(_)));
    }

    #[test]
    fn test_document_scope_matches_escaped_literal_key() {
        let xml = fixtures::slide_xml(&["R&D: {{x}}"]);
        let plan = plan(vec![("R&D", KpiValue::from("Research"))]);

        let (text_out, text_count) = rewrite_text_nodes(&xml, &plan).unwrap();
        let (doc_out, doc_count) = rewrite_document(&xml, &plan).unwrap();

        assert_eq!(text_count, 1);
        assert_eq!(doc_count, 1);
        assert_eq!(fixtures::slide_texts(&text_out), vec!["Research: {{x}}"]);
        assert_eq!(fixtures::slide_texts(&doc_out), vec!["Research: {{x}}"]);
    }

    #[test]
    fn test_document_scope_pattern_keys_see_raw_markup() {
        let xml = fixtures::slide_xml(&["R&D"]);
        let kpis: KpiMap = vec![("R&amp;D", KpiValue::from("Research"))].into_iter().collect();
        let options = SubstitutionOptions {
            key_matching: KeyMatching::Pattern,
            ..SubstitutionOptions::default()
        };
        let plan = SubstitutionPlan::build(&kpis, &options, true).unwrap();

        let (out, count) = rewrite_document(&xml, &plan).unwrap();

        assert_eq!(count, 1);
        assert_eq!(fixtures::slide_texts(&out), vec!["Research"]);
    }

    #[test]
    fn test_document_scope_touches_markup() {
        // Renaming every txBox attribute keeps the XML well-formed but
        // shows that the whole-blob scope reaches into markup.
        let xml = fixtures::slide_xml(&["text"]);
        let plan = plan(vec![("txBox", KpiValue::from("renamed"))]);

        let (text_out, text_count) = rewrite_text_nodes(&xml, &plan).unwrap();
        let (doc_out, doc_count) = rewrite_document(&xml, &plan).unwrap();

        assert_eq!(text_count, 0);
        assert_eq!(text_out, xml);
        assert_eq!(doc_count, 1);
        assert!(doc_out.contains(r#"renamed="1""#));
    }

    #[test]
    fn test_substitute_slides_counts_all() {
        let mut deck = fixtures::deck(&[
            fixtures::slide_xml(&["{{x}}"]),
            fixtures::slide_xml(&["none"]),
            fixtures::slide_xml(&["{{x}} {{x}}"]),
        ]);
        let plan = plan(vec![("{{x}}", KpiValue::Number(7.0))]);

        let total = substitute_slides(&mut deck, &plan, SubstitutionScope::Text).unwrap();

        assert_eq!(total, 3);
        let xml = deck.part_str("ppt/slides/slide3.xml").unwrap();
        assert_eq!(fixtures::slide_texts(&xml), vec!["7 7"]);
    }

    #[test]
    fn test_check_well_formed() {
        assert!(check_well_formed("<a><b/></a>").is_ok());
        assert!(check_well_formed("<a><b></a>").is_err());
        assert!(check_well_formed("<a></a><a></a>").is_err());
        assert!(check_well_formed("<a>").is_err());
        assert!(check_well_formed("<a b/>").is_err());
        assert!(check_well_formed(r#"<a x="1" x="2"/>"#).is_err());
        assert!(check_well_formed(r#"<r><a x="1" x="2"></a></r>"#).is_err());
        assert!(check_well_formed(r#"<r><a x="1" y='2'/></r>"#).is_ok());
    }
}
