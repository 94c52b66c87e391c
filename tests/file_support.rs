//! Real PDFs through both extraction backends.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tempfile::TempDir;

use grounded_qa::extract::{
    extract_document, DocumentFile, LopdfExtractor, PageExtractor, PdfExtractExtractor,
};

const LONG_PAGE: &str =
    "Volatility clustering means large price changes tend to be followed by large changes.";

/// Write a PDF with one page per entry in `pages`, each drawn as a single line.
fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![40.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

fn two_page_pdf(tmp: &TempDir) -> DocumentFile {
    let path = tmp.path().join("clustering.pdf");
    write_pdf(&path, &[LONG_PAGE, "short"]);
    DocumentFile {
        path,
        domain: "volatility".into(),
        source: "clustering.pdf".into(),
    }
}

fn assert_first_page_kept(extractor: &dyn PageExtractor) {
    let tmp = TempDir::new().unwrap();
    let file = two_page_pdf(&tmp);

    let out = extract_document(&file, extractor, 50).unwrap();
    assert_eq!(out.pages.len(), 1, "{}: {:?}", extractor.name(), out.pages);
    assert_eq!(out.pages[0].metadata.page, 1);
    assert_eq!(out.pages[0].metadata.domain, "volatility");
    let text = &out.pages[0].text;
    assert!(text.contains("clustering"), "{}", text);
    assert_eq!(out.pages_discarded, 1);
    assert!(out.pages_skipped.is_empty());
}

#[test]
fn test_lopdf_backend_numbers_pages_and_drops_short_page() {
    assert_first_page_kept(&LopdfExtractor);
}

#[test]
fn test_pdf_extract_backend_numbers_pages_and_drops_short_page() {
    assert_first_page_kept(&PdfExtractExtractor);
}

#[test]
fn test_garbage_pdf_is_a_file_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.4 not really").unwrap();
    assert!(LopdfExtractor.extract_pages(&path).is_err());
}
