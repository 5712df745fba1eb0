use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::RenderError;
use crate::images::ImageLibrary;
use crate::layout::{Page, PageGeometry, Placed};
use crate::metrics::{encode_win_ansi, Font};

/// Turns laid-out pages into a PDF built with standard-14 fonts.
pub struct PdfWriter<'a> {
    geometry: &'a PageGeometry,
    images: &'a ImageLibrary,
    title: String,
}

impl<'a> PdfWriter<'a> {
    pub fn new(geometry: &'a PageGeometry, images: &'a ImageLibrary, title: impl Into<String>) -> Self {
        Self {
            geometry,
            images,
            title: title.into(),
        }
    }

    pub fn render(&self, pages: &[Page]) -> Result<Document, RenderError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = Dictionary::new();
        for font in Font::ALL {
            let font_id = doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name(), font_id);
        }

        let mut xobjects: HashMap<String, (String, ObjectId)> = HashMap::new();
        let mut kids = Vec::with_capacity(pages.len());

        for page in pages {
            let mut operations = Vec::new();
            let mut page_xobjects = Dictionary::new();

            for item in &page.items {
                match item {
                    Placed::Text {
                        x,
                        y,
                        font,
                        size,
                        text,
                    } => {
                        operations.push(Operation::new("BT", vec![]));
                        operations.push(Operation::new(
                            "Tf",
                            vec![font.resource_name().into(), (*size).into()],
                        ));
                        operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                        operations.push(Operation::new(
                            "Tj",
                            vec![Object::string_literal(encode_win_ansi(text))],
                        ));
                        operations.push(Operation::new("ET", vec![]));
                    }
                    Placed::Image {
                        source,
                        x,
                        y,
                        width,
                        height,
                    } => {
                        let image = self
                            .images
                            .get(source)
                            .ok_or_else(|| RenderError::MissingImage(source.clone()))?;
                        let xobject = match image.xobject.as_ref() {
                            Some(xobject) => xobject,
                            None => {
                                warn!("No image data for {}, drawing a placeholder", source);
                                operations.extend(placeholder(*x, *y, *width, *height));
                                continue;
                            }
                        };
                        let next_index = xobjects.len() + 1;
                        let (name, id) = xobjects
                            .entry(source.clone())
                            .or_insert_with(|| (format!("Im{}", next_index), doc.add_object(xobject.clone())))
                            .clone();
                        page_xobjects.set(name.as_bytes().to_vec(), id);

                        operations.push(Operation::new("q", vec![]));
                        operations.push(Operation::new(
                            "cm",
                            vec![
                                (*width).into(),
                                0.into(),
                                0.into(),
                                (*height).into(),
                                (*x).into(),
                                (*y).into(),
                            ],
                        ));
                        operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
                        operations.push(Operation::new("Q", vec![]));
                    }
                }
            }

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let mut resources = dictionary! {
                "Font" => fonts.clone(),
            };
            if !page_xobjects.is_empty() {
                resources.set("XObject", page_xobjects);
            }
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources,
            });
            kids.push(Object::Reference(page_id));
        }

        debug!("Rendered {} pages with {} distinct images", kids.len(), xobjects.len());

        let page_count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => page_count,
                "MediaBox" => vec![
                    0.into(),
                    0.into(),
                    self.geometry.page_width.into(),
                    self.geometry.page_height.into(),
                ],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(encode_win_ansi(&self.title)),
            "Producer" => Object::string_literal("helpdesk2pdf"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        Ok(doc)
    }

    /// Writes the document next to `output_path` first and renames it into
    /// place, so an existing file is only replaced by a complete one.
    pub async fn save(&self, doc: &mut Document, output_path: &Path) -> Result<(), RenderError> {
        let mut data = Vec::new();
        doc.save_to(&mut data)?;

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(output_path);
        fs::write(&partial, data).await?;
        if let Err(e) = fs::rename(&partial, output_path).await {
            fs::remove_file(&partial).await.ok();
            return Err(e.into());
        }

        info!("Wrote {} pages to {}", doc.get_pages().len(), output_path.display());
        Ok(())
    }
}

fn partial_path(output_path: &Path) -> PathBuf {
    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.pdf".to_string());
    output_path.with_file_name(format!(".{}.partial", file_name))
}

fn placeholder(x: f32, y: f32, width: f32, height: f32) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new("G", vec![0.6.into()]),
        Operation::new("re", vec![x.into(), y.into(), width.into(), height.into()]),
        Operation::new("S", vec![]),
        Operation::new("Q", vec![]),
    ]
}
