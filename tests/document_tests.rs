//! Text extraction from generated PDFs and plain text uploads

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Object, Stream};
use ragbot::document::{extract, Document, ExtractError};

/// Build a minimal PDF with one line of text per page; an empty string
/// becomes a page with no content stream at all
fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        };
        if !text.is_empty() {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            page.set("Contents", content_id);
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_pdf_pages_in_order() {
    let bytes = pdf_with_pages(&["Refunds take five days", "Shipping is free over fifty"]);
    let text = extract(&Document::new(bytes, "application/pdf")).unwrap();

    let first = text.find("Refunds take five days").unwrap();
    let second = text.find("Shipping is free over fifty").unwrap();
    assert!(first < second);
}

#[test]
fn test_pdf_page_without_contents_keeps_its_slot() {
    let pdf = |pages: &[&str]| extract(&Document::new(pdf_with_pages(pages), "application/pdf")).unwrap();
    let alpha = pdf(&["Alpha"]);
    let gamma = pdf(&["Gamma"]);

    let text = pdf(&["Alpha", "", "Gamma"]);
    assert_eq!(text, format!("{}\n\n{}", alpha, gamma));
    assert_eq!(text, "Alpha\n\n\nGamma\n");
    assert!(text.find("Alpha").unwrap() < text.find("Gamma").unwrap());
}

#[test]
fn test_pdf_media_type_with_parameters() {
    let bytes = pdf_with_pages(&["Only page"]);
    let text = extract(&Document::new(bytes, "Application/PDF; version=1.5")).unwrap();
    assert!(text.contains("Only page"));
}

#[test]
fn test_plain_text_is_returned_verbatim() {
    let text = "First paragraph.\n\nSecond paragraph with ünïcödé.\n";
    let extracted = extract(&Document::new(text.as_bytes(), "text/plain")).unwrap();
    assert_eq!(extracted, text);
}

#[test]
fn test_pdf_bytes_declared_as_image() {
    let bytes = pdf_with_pages(&["Hidden"]);
    assert_eq!(
        extract(&Document::new(bytes, "image/png")),
        Err(ExtractError::UnsupportedFormat("image/png".to_string()))
    );
}
