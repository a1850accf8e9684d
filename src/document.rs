//! PDF assembly.
//!
//! Pages are sized once per document from a reference content aspect ratio;
//! every captured bitmap is cropped to the placement box and embedded as a
//! JPEG that fills it edge to edge.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::canvas::{crop_to_aspect, Bitmap};
use crate::config::{Margin, Orientation, PdfConfig, MAX_ENCODE_QUALITY};
use crate::{DexError, Result};

/// JPEG quality used when the first encode attempt fails.
pub const FALLBACK_QUALITY: f32 = 0.7;

const PDF_VERSION: &str = "1.5";
const POINTS_PER_MM: f64 = 72.0 / 25.4;

/// Content ratios outside this band get a page height fitted to them.
const LANDSCAPE_BAND: (f64, f64) = (1.2, 1.6);

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * POINTS_PER_MM
}

/// Physical page size and the placement box inside it, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width_mm: f64,
    pub height_mm: f64,
    pub margin: Margin,
}

impl PageGeometry {
    /// Oriented base size, with the height refitted when the content ratio
    /// strays too far from the base ratio. Width never changes.
    pub fn for_content(reference_aspect: Option<f64>, pdf: &PdfConfig) -> Self {
        let (width, mut height) = pdf.format.oriented_mm(pdf.orientation);
        let (low, high) = match pdf.orientation {
            Orientation::Landscape => LANDSCAPE_BAND,
            Orientation::Portrait => (1.0 / LANDSCAPE_BAND.1, 1.0 / LANDSCAPE_BAND.0),
        };

        if let Some(aspect) = reference_aspect.filter(|a| a.is_finite() && *a > 0.0) {
            if aspect > high || aspect < low {
                height = width / aspect;
            }
        }

        Self {
            width_mm: width,
            height_mm: height,
            margin: pdf.margin,
        }
    }

    pub fn box_width_mm(&self) -> f64 {
        (self.width_mm - self.margin.left - self.margin.right).max(1.0)
    }

    pub fn box_height_mm(&self) -> f64 {
        (self.height_mm - self.margin.top - self.margin.bottom).max(1.0)
    }
}

/// A document under construction.
pub struct PdfDocument {
    doc: Document,
    pages_id: ObjectId,
    geometry: PageGeometry,
    page_ids: Vec<ObjectId>,
    initial_page_used: bool,
}

impl PdfDocument {
    pub fn geometry(&self) -> &PageGeometry {
        &self.geometry
    }

    /// Pages holding a placed image.
    pub fn page_count(&self) -> usize {
        if self.initial_page_used {
            self.page_ids.len()
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    pdf: PdfConfig,
    quality: f32,
    compression: bool,
}

impl DocumentAssembler {
    pub fn new(pdf: PdfConfig, quality: f32, compression: bool) -> Self {
        Self {
            pdf,
            quality: quality.min(MAX_ENCODE_QUALITY),
            compression,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    /// Starts a document holding one empty page, which the first
    /// [`add_page`](Self::add_page) call fills.
    pub fn create_document(&self, reference_aspect: Option<f64>) -> PdfDocument {
        let geometry = PageGeometry::for_content(reference_aspect, &self.pdf);
        let mut doc = Document::with_version(PDF_VERSION);
        let pages_id = doc.new_object_id();
        let initial = doc.add_object(page_dictionary(pages_id, &geometry, None));

        tracing::debug!(
            width_mm = geometry.width_mm,
            height_mm = geometry.height_mm,
            "document created"
        );

        PdfDocument {
            doc,
            pages_id,
            geometry,
            page_ids: vec![initial],
            initial_page_used: false,
        }
    }

    /// Places `bitmap` full-bleed on page `page_index`. Index 0 reuses the
    /// initial page; any later index appends a new one.
    pub fn add_page(&self, document: &mut PdfDocument, bitmap: &Bitmap, page_index: usize) -> Result<()> {
        let geometry = document.geometry;
        let cropped = crop_to_aspect(bitmap, geometry.box_width_mm(), geometry.box_height_mm());
        let jpeg = self.encode(&cropped, page_index)?;

        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => cropped.width() as i64,
                "Height" => cropped.height() as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false);
        let image_id = document.doc.add_object(image);

        let content = Content {
            operations: placement_operations(&geometry),
        };
        let content_id = document
            .doc
            .add_object(Stream::new(lopdf::Dictionary::new(), content.encode()?));

        let page = page_dictionary(document.pages_id, &geometry, Some((content_id, image_id)));
        if page_index == 0 && !document.initial_page_used {
            let initial = document.page_ids[0];
            document.doc.objects.insert(initial, Object::Dictionary(page));
            document.initial_page_used = true;
        } else {
            let id = document.doc.add_object(page);
            if document.initial_page_used {
                document.page_ids.push(id);
            } else {
                // Nothing landed on the initial page; take its slot.
                document.doc.objects.remove(&document.page_ids[0]);
                document.page_ids[0] = id;
                document.initial_page_used = true;
            }
        }

        tracing::debug!(
            page_index,
            width = cropped.width(),
            height = cropped.height(),
            "page added"
        );
        Ok(())
    }

    /// Serializes the document to PDF bytes.
    pub fn finalize(&self, mut document: PdfDocument) -> Result<Vec<u8>> {
        if !document.initial_page_used {
            return Err(DexError::document("document has no pages"));
        }

        let kids: Vec<Object> = document.page_ids.iter().map(|id| (*id).into()).collect();
        let count = kids.len() as i64;
        document.doc.objects.insert(
            document.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => document.pages_id,
        });
        document.doc.trailer.set("Root", catalog_id);

        if self.compression {
            document.doc.compress();
        }

        let mut bytes = Vec::new();
        document.doc.save_to(&mut bytes)?;
        Ok(bytes)
    }

    fn encode(&self, bitmap: &Bitmap, page_index: usize) -> Result<Vec<u8>> {
        match bitmap.encode_jpeg(self.quality) {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                tracing::warn!(
                    page_index,
                    error = %err,
                    quality = FALLBACK_QUALITY,
                    "image embed failed; retrying at lower quality"
                );
                bitmap.encode_jpeg(FALLBACK_QUALITY)
            }
        }
    }
}

fn page_dictionary(
    parent: ObjectId,
    geometry: &PageGeometry,
    body: Option<(ObjectId, ObjectId)>,
) -> lopdf::Dictionary {
    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => parent,
        "MediaBox" => vec![
            0.into(),
            0.into(),
            (mm_to_pt(geometry.width_mm) as f32).into(),
            (mm_to_pt(geometry.height_mm) as f32).into(),
        ],
    };
    if let Some((content_id, image_id)) = body {
        page.set("Contents", content_id);
        page.set(
            "Resources",
            dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
        );
    }
    page
}

/// `q w 0 0 h x y cm /Im0 Do Q` with the box anchored at the bottom margin.
fn placement_operations(geometry: &PageGeometry) -> Vec<Operation> {
    let real = |mm: f64| Object::Real(mm_to_pt(mm) as f32);
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                real(geometry.box_width_mm()),
                0.into(),
                0.into(),
                real(geometry.box_height_mm()),
                real(geometry.margin.left),
                real(geometry.margin.bottom),
            ],
        ),
        Operation::new("Do", vec!["Im0".into()]),
        Operation::new("Q", vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PdfFormat;
    use image::Rgba;

    fn a4_landscape() -> PdfConfig {
        PdfConfig::default()
    }

    #[test]
    fn standard_ratio_keeps_a4_landscape() {
        let geometry = PageGeometry::for_content(Some(1.414), &a4_landscape());
        assert_eq!(geometry.width_mm, 297.0);
        assert_eq!(geometry.height_mm, 210.0);
    }

    #[test]
    fn wide_content_refits_page_height() {
        let geometry = PageGeometry::for_content(Some(16.0 / 9.0), &a4_landscape());
        assert_eq!(geometry.width_mm, 297.0);
        assert!((geometry.height_mm - 167.0625).abs() < 1e-9);

        let square = PageGeometry::for_content(Some(1.0), &a4_landscape());
        assert_eq!(square.height_mm, 297.0);
    }

    #[test]
    fn missing_reference_uses_base_size() {
        let pdf = PdfConfig {
            format: PdfFormat::Letter,
            orientation: Orientation::Portrait,
            ..PdfConfig::default()
        };
        let geometry = PageGeometry::for_content(None, &pdf);
        assert_eq!(geometry.width_mm, 215.9);
        assert_eq!(geometry.height_mm, 279.4);
    }

    #[test]
    fn margins_shrink_the_placement_box() {
        let pdf = PdfConfig {
            margin: Margin {
                top: 10.0,
                right: 5.0,
                bottom: 10.0,
                left: 5.0,
            },
            ..PdfConfig::default()
        };
        let geometry = PageGeometry::for_content(Some(1.414), &pdf);
        assert_eq!(geometry.box_width_mm(), 287.0);
        assert_eq!(geometry.box_height_mm(), 190.0);
    }

    #[test]
    fn assembles_multi_page_pdf() {
        let assembler = DocumentAssembler::new(PdfConfig::default(), 0.99, false);
        assert_eq!(assembler.quality(), MAX_ENCODE_QUALITY);

        let mut doc = assembler.create_document(Some(16.0 / 9.0));
        assert_eq!(doc.page_count(), 0);
        for index in 0..3 {
            let bitmap = Bitmap::filled(320, 180, Rgba([200, 10, 10, 255]));
            assembler.add_page(&mut doc, &bitmap, index).unwrap();
        }
        assert_eq!(doc.page_count(), 3);

        let bytes = assembler.finalize(doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let parsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(parsed.get_pages().len(), 3);
    }

    #[test]
    fn compressed_output_still_loads() {
        let assembler = DocumentAssembler::new(PdfConfig::default(), 0.9, true);
        let mut doc = assembler.create_document(None);
        assembler
            .add_page(&mut doc, &Bitmap::filled(64, 48, Rgba([0, 0, 255, 255])), 0)
            .unwrap();
        let bytes = assembler.finalize(doc).unwrap();
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 1);
    }

    #[test]
    fn empty_document_cannot_be_finalized() {
        let assembler = DocumentAssembler::new(PdfConfig::default(), 0.9, false);
        let doc = assembler.create_document(None);
        assert!(matches!(
            assembler.finalize(doc),
            Err(DexError::Document(_))
        ));
    }
}
