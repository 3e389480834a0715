//! Image Composition Tool
//!
//! Stitches the incoming images into a `row` x `column` grid on a white
//! canvas, with a title band above each image, and saves the result to
//! `output_path`. Images come from each input message's first `url` (a
//! local path or an http(s) URL), or from plain path strings.
//!
//! Every grid cell is as large as the largest image plus `spacing`, and
//! `title_height` is added to its height. Titles are drawn only when
//! `font_name` points at a TrueType/OpenType font file.

use std::io::Cursor;
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use async_trait::async_trait;
use image::{imageops, DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use serde_json::Value;
use workflow_engine::{
    value::value_text, BuildContext, FactoryRegistration, FlowValue, Msg, NodeKind,
    NodeRequest, Operator, Outcome, Role, Scope, WorkflowError,
};

use crate::error::{NodeError, Result};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// Grid geometry, in cells and pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub row: u32,
    pub column: u32,
    pub spacing: u32,
    pub title_height: u32,
}

impl Default for GridLayout {
    fn default() -> Self {
        Self {
            row: 1,
            column: 1,
            spacing: 10,
            title_height: 100,
        }
    }
}

impl GridLayout {
    pub fn capacity(&self) -> u32 {
        self.row.saturating_mul(self.column)
    }
}

/// Place `images` on a grid canvas, drawing `titles` with `font` if given
pub fn stitch(
    images: &[DynamicImage],
    titles: &[String],
    layout: &GridLayout,
    font: Option<&FontVec>,
) -> RgbImage {
    let max_width = images.iter().map(DynamicImage::width).max().unwrap_or(0);
    let max_height = images.iter().map(DynamicImage::height).max().unwrap_or(0);
    let cell_width = max_width + layout.spacing;
    let cell_height = max_height + layout.title_height + layout.spacing;

    let mut canvas = RgbImage::from_pixel(
        layout.column * cell_width,
        layout.row * cell_height,
        WHITE,
    );
    let font_size = layout.title_height / 2;

    for (idx, image) in (0u32..).zip(images) {
        let x = (idx % layout.column) * cell_width;
        let top = (idx / layout.column) * cell_height;

        if let (Some(font), Some(title)) = (font, titles.get(idx as usize)) {
            draw_text_mut(
                &mut canvas,
                BLACK,
                (x + layout.spacing / 2) as i32,
                (top + (layout.title_height - font_size) / 2) as i32,
                PxScale::from(font_size as f32),
                font,
                title,
            );
        }
        imageops::replace(
            &mut canvas,
            &image.to_rgb8(),
            i64::from(x),
            i64::from(top + layout.title_height),
        );
    }
    canvas
}

/// Image locations carried by the input, in order
fn image_sources(input: &FlowValue) -> Vec<String> {
    match input {
        FlowValue::Null => Vec::new(),
        FlowValue::List(items) => items.iter().flat_map(image_sources).collect(),
        FlowValue::Message(msg) => {
            let source = msg
                .url
                .as_ref()
                .and_then(|urls| urls.first().cloned())
                .unwrap_or_else(|| msg.text());
            vec![source]
        }
        FlowValue::Data(Value::Array(items)) => items.iter().map(value_text).collect(),
        FlowValue::Data(value) => vec![value_text(value)],
    }
}

pub struct ImageCompositionTool {
    node_id: String,
    titles: Vec<String>,
    output_path: String,
    layout: GridLayout,
    font_path: Option<String>,
    client: reqwest::Client,
}

impl ImageCompositionTool {
    pub fn new(
        node_id: impl Into<String>,
        titles: Vec<String>,
        output_path: impl Into<String>,
        layout: GridLayout,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            titles,
            output_path: output_path.into(),
            layout,
            font_path: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_font(mut self, font_path: impl Into<String>) -> Self {
        self.font_path = Some(font_path.into());
        self
    }

    async fn load(&self, source: &str) -> Result<DynamicImage> {
        let bytes = if source.starts_with("http://") || source.starts_with("https://") {
            let response = self.client.get(source).send().await?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(NodeError::Api { status, body });
            }
            response.bytes().await?.to_vec()
        } else {
            tokio::fs::read(source).await?
        };
        Ok(image::load_from_memory(&bytes)?)
    }

    async fn font(&self) -> Result<Option<FontVec>> {
        let Some(path) = &self.font_path else {
            log::warn!(
                "ImageComposition {}: no font_name set, titles are left blank",
                self.node_id
            );
            return Ok(None);
        };
        let bytes = tokio::fs::read(path).await?;
        FontVec::try_from_vec(bytes)
            .map(Some)
            .map_err(|e| NodeError::Font {
                path: path.clone(),
                message: e.to_string(),
            })
    }

    async fn save(&self, canvas: RgbImage) -> Result<()> {
        let format = ImageFormat::from_path(&self.output_path)?;
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(canvas).write_to(&mut Cursor::new(&mut bytes), format)?;
        tokio::fs::write(&self.output_path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Operator for ImageCompositionTool {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::ImageComposition
    }

    async fn invoke(&self, input: FlowValue, _scope: &Scope<'_>) -> workflow_engine::Result<Outcome> {
        let sources = image_sources(&input);
        if sources.is_empty() {
            return Err(WorkflowError::invalid_argument(
                &self.node_id,
                "input",
                "no images to compose",
            ));
        }
        if sources.len() > self.layout.capacity() as usize {
            return Err(WorkflowError::invalid_argument(
                &self.node_id,
                "row",
                format!(
                    "{} images do not fit a {}x{} grid",
                    sources.len(),
                    self.layout.row,
                    self.layout.column
                ),
            ));
        }

        let mut images = Vec::with_capacity(sources.len());
        for source in &sources {
            images.push(self.load(source).await?);
        }
        let font = self.font().await?;

        let canvas = stitch(&images, &self.titles, &self.layout, font.as_ref());
        self.save(canvas).await?;
        log::info!(
            "ImageComposition {}: wrote {} images to '{}'",
            self.node_id,
            images.len(),
            self.output_path
        );

        let msg = Msg::new("ImageComposition", self.output_path.clone(), Role::Assistant)
            .with_url(vec![self.output_path.clone()]);
        Ok(FlowValue::from(msg).into())
    }
}

fn grid_dimension(request: &NodeRequest<'_>, key: &str, default: u32) -> workflow_engine::Result<u32> {
    let value = request.args().opt_u64(key)?.unwrap_or(u64::from(default));
    u32::try_from(value)
        .map_err(|_| WorkflowError::invalid_argument(request.node_id, key, "value is too large"))
}

fn build(
    request: &NodeRequest<'_>,
    _ctx: &mut BuildContext<'_>,
) -> workflow_engine::Result<Arc<dyn Operator>> {
    let args = request.args();
    let defaults = GridLayout::default();
    let layout = GridLayout {
        row: grid_dimension(request, "row", defaults.row)?,
        column: grid_dimension(request, "column", defaults.column)?,
        spacing: grid_dimension(request, "spacing", defaults.spacing)?,
        title_height: grid_dimension(request, "title_height", defaults.title_height)?,
    };
    if layout.capacity() == 0 {
        return Err(WorkflowError::invalid_argument(
            request.node_id,
            "row",
            "the grid needs at least one row and one column",
        ));
    }

    let mut tool = ImageCompositionTool::new(
        request.node_id,
        args.str_list("titles")?,
        args.str("output_path")?,
        layout,
    );
    if let Some(font) = args.opt_str("font_name")?.filter(|f| !f.is_empty()) {
        tool = tool.with_font(font);
    }
    Ok(Arc::new(tool))
}

inventory::submit!(FactoryRegistration {
    kind: NodeKind::ImageComposition,
    factory: build,
});
