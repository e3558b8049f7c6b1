//! Additive drawing on existing PDF pages with lopdf.
//!
//! The page's own content streams are never decoded. A page is drawn on by
//! wrapping its existing streams in `q`/`Q` and appending one new stream;
//! fonts, graphics states and images are registered under fresh resource
//! names that cannot clash with the page's own.

use crate::domain::BBox;
use crate::error::{RedactorError, RedactorResult};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// Smallest font size drawn.
pub const MIN_FONT_SIZE: f32 = 4.0;

/// Narrowest horizontal scaling applied to text that still overflows.
pub const MIN_HORIZONTAL_SCALE: f32 = 0.1;

/// Helvetica advance widths for `' '..='~'`, in thousandths of an em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

/// Width used for characters outside printable ASCII.
const DEFAULT_WIDTH: u16 = 556;

/// RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
    pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);
}

/// Visible page area and rotation of one page.
///
/// Parsed boxes live in display space: the CropBox rotated by `/Rotate`,
/// with a top-left origin. Drawing happens in the same space with a
/// bottom-left origin, under the matrix from [`PageGeometry::display_matrix`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    /// CropBox clipped to the MediaBox, in PDF user space
    pub llx: f32,
    pub lly: f32,
    pub urx: f32,
    pub ury: f32,
    /// Clockwise rotation in degrees: 0, 90, 180 or 270
    pub rotation: u16,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            llx: 0.0,
            lly: 0.0,
            urx: 612.0,
            ury: 792.0,
            rotation: 0,
        }
    }
}

impl PageGeometry {
    /// Geometry from raw MediaBox, CropBox and `/Rotate` values.
    pub fn from_boxes(media: [f32; 4], crop: Option<[f32; 4]>, rotate: i64) -> Self {
        let normalize = |b: [f32; 4]| [b[0].min(b[2]), b[1].min(b[3]), b[0].max(b[2]), b[1].max(b[3])];
        let media = normalize(media);
        let visible = crop
            .map(normalize)
            .map(|c| [c[0].max(media[0]), c[1].max(media[1]), c[2].min(media[2]), c[3].min(media[3])])
            .filter(|c| c[2] > c[0] && c[3] > c[1])
            .unwrap_or(media);

        Self {
            llx: visible[0],
            lly: visible[1],
            urx: visible[2],
            ury: visible[3],
            rotation: (rotate.rem_euclid(360) / 90 * 90) as u16,
        }
    }

    fn width(&self) -> f32 {
        self.urx - self.llx
    }

    fn height(&self) -> f32 {
        self.ury - self.lly
    }

    /// Width and height of the page as displayed.
    pub fn display_size(&self) -> (f32, f32) {
        match self.rotation {
            90 | 270 => (self.height(), self.width()),
            _ => (self.width(), self.height()),
        }
    }

    /// `cm` operands mapping bottom-left display space into user space.
    pub fn display_matrix(&self) -> [f32; 6] {
        match self.rotation {
            90 => [0.0, 1.0, -1.0, 0.0, self.urx, self.lly],
            180 => [-1.0, 0.0, 0.0, -1.0, self.urx, self.ury],
            270 => [0.0, -1.0, 1.0, 0.0, self.llx, self.ury],
            _ => [1.0, 0.0, 0.0, 1.0, self.llx, self.lly],
        }
    }

    /// `(x, y, width, height)` of `bbox` in display space with a bottom-left origin.
    pub fn to_display_space(&self, bbox: &BBox) -> (f32, f32, f32, f32) {
        let (_, display_height) = self.display_size();
        (bbox.x0, display_height - bbox.y1, bbox.width(), bbox.height())
    }

    /// `(x, y, width, height)` of `bbox` in PDF user space, for annotations.
    pub fn to_user_space(&self, bbox: &BBox) -> (f32, f32, f32, f32) {
        let (x, y, w, h) = self.to_display_space(bbox);
        let [a, b, c, d, e, f] = self.display_matrix();
        let corners = [(x, y), (x + w, y), (x, y + h), (x + w, y + h)]
            .map(|(px, py)| (a * px + c * py + e, b * px + d * py + f));

        let x0 = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
        let y0 = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
        let x1 = corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
        let y1 = corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
        (x0, y0, x1 - x0, y1 - y0)
    }
}

/// Font size and horizontal scaling that fit a string into a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextFit {
    pub size: f32,
    /// Horizontal scaling, `1.0` for none
    pub scale: f32,
}

impl TextFit {
    /// Width of `text` drawn with this fit.
    pub fn drawn_width(&self, text: &str) -> f32 {
        text_width(text, self.size) * self.scale
    }
}

/// Operations queued for one page.
#[derive(Debug, Default)]
pub struct PageCanvas {
    ops: Vec<Operation>,
}

impl PageCanvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn save_state(&mut self) {
        self.ops.push(Operation::new("q", vec![]));
    }

    pub fn restore_state(&mut self) {
        self.ops.push(Operation::new("Q", vec![]));
    }

    pub fn set_graphics_state(&mut self, name: &[u8]) {
        self.ops
            .push(Operation::new("gs", vec![Object::Name(name.to_vec())]));
    }

    /// Concatenates `matrix` to the current transformation.
    pub fn transform(&mut self, matrix: [f32; 6]) {
        self.ops.push(Operation::new(
            "cm",
            matrix.iter().map(|v| (*v).into()).collect(),
        ));
    }

    /// Intersects the clipping path with `rect`.
    pub fn clip_rect(&mut self, rect: (f32, f32, f32, f32)) {
        let (x, y, w, h) = rect;
        self.ops
            .push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        self.ops.push(Operation::new("W", vec![]));
        self.ops.push(Operation::new("n", vec![]));
    }

    pub fn fill_rect(&mut self, rect: (f32, f32, f32, f32), color: Rgb) {
        let (x, y, w, h) = rect;
        self.ops.push(rgb_op("rg", color));
        self.ops
            .push(Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]));
        self.ops.push(Operation::new("f", vec![]));
    }

    /// Draws a single line of text with its baseline at `(x, y)`.
    pub fn text(&mut self, font: &[u8], size: f32, x: f32, y: f32, color: Rgb, text: &str) {
        self.fitted_text(font, TextFit { size, scale: 1.0 }, x, y, color, text);
    }

    /// Draws a single line of text at the size and scaling of `fit`.
    pub fn fitted_text(&mut self, font: &[u8], fit: TextFit, x: f32, y: f32, color: Rgb, text: &str) {
        self.ops.push(Operation::new("BT", vec![]));
        self.ops.push(rgb_op("rg", color));
        self.ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font.to_vec()), fit.size.into()],
        ));
        if fit.scale < 1.0 {
            self.ops
                .push(Operation::new("Tz", vec![(fit.scale * 100.0).into()]));
        }
        self.ops.push(Operation::new("Td", vec![x.into(), y.into()]));
        self.ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
        ));
        self.ops.push(Operation::new("ET", vec![]));
    }

    /// Draws an image XObject stretched over `rect`.
    pub fn image(&mut self, name: &[u8], rect: (f32, f32, f32, f32)) {
        let (x, y, w, h) = rect;
        self.save_state();
        self.ops.push(Operation::new(
            "cm",
            vec![w.into(), Object::Integer(0), Object::Integer(0), h.into(), x.into(), y.into()],
        ));
        self.ops
            .push(Operation::new("Do", vec![Object::Name(name.to_vec())]));
        self.restore_state();
    }

    /// Appends the queued operations to the page.
    pub fn flush(self, doc: &mut Document, page_id: ObjectId) -> RedactorResult<()> {
        if self.ops.is_empty() {
            return Ok(());
        }

        // The leading Q closes the state opened before the page's own streams.
        let mut operations = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
        operations.extend(self.ops);
        operations.push(Operation::new("Q", vec![]));
        let encoded = Content { operations }.encode()?;

        let open = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let stamp = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let mut contents: Vec<Object> = vec![Object::Reference(open)];
        contents.extend(
            doc.get_page_contents(page_id)
                .into_iter()
                .map(Object::Reference),
        );
        contents.push(Object::Reference(stamp));

        page_dict_mut(doc, page_id)?.set("Contents", Object::Array(contents));
        Ok(())
    }
}

fn rgb_op(operator: &str, color: Rgb) -> Operation {
    Operation::new(operator, vec![color.0.into(), color.1.into(), color.2.into()])
}

/// Encodes text for a WinAnsi Helvetica font; unmappable chars become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7e | 0xa0..=0xff => c as u32 as u8,
            0x2018 | 0x2019 => b'\'',
            0x201c | 0x201d => b'"',
            0x2013 | 0x2014 => b'-',
            _ => b'?',
        })
        .collect()
}

/// Font size that fits `text` into a box of `width` x `height`, never
/// below [`MIN_FONT_SIZE`].
pub fn fit_font_size(text: &str, preferred: f32, width: f32, height: f32) -> f32 {
    let mut size = if preferred > 0.0 { preferred } else { height * 0.8 };
    size = size.min(height);
    let unit = text_width(text, 1.0);
    if unit * size > width && width > 0.0 && unit > 0.0 {
        size = width / unit;
    }
    size.max(MIN_FONT_SIZE)
}

/// Size plus horizontal scaling so that `text` spans at most `width`.
pub fn fit_text(text: &str, preferred: f32, width: f32, height: f32) -> TextFit {
    let size = fit_font_size(text, preferred, width, height);
    let natural = text_width(text, size);
    let scale = if natural > width && natural > 0.0 {
        (width.max(0.0) / natural).max(MIN_HORIZONTAL_SCALE)
    } else {
        1.0
    };
    TextFit { size, scale }
}

/// Rendered Helvetica width of `text` at `size`.
pub fn text_width(text: &str, size: f32) -> f32 {
    let units: u32 = text
        .chars()
        .map(|c| match c {
            ' '..='~' => u32::from(HELVETICA_WIDTHS[c as usize - 0x20]),
            _ => u32::from(DEFAULT_WIDTH),
        })
        .sum();
    units as f32 / 1000.0 * size
}

/// Visible area and rotation of a page, following `Parent` links for
/// inherited values.
pub fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let rect = |key: &[u8]| {
        inherited(doc, page_id, key).and_then(|obj| {
            let values: Vec<f32> = resolve(doc, obj)
                .as_array()
                .ok()?
                .iter()
                .filter_map(|v| number(resolve(doc, v)))
                .collect();
            <[f32; 4]>::try_from(values).ok()
        })
    };
    let rotate = inherited(doc, page_id, b"Rotate")
        .and_then(|obj| number(resolve(doc, obj)))
        .map(|r| r.round() as i64)
        .unwrap_or(0);

    let media = rect(b"MediaBox").unwrap_or([0.0, 0.0, 612.0, 792.0]);
    PageGeometry::from_boxes(media, rect(b"CropBox"), rotate)
}

/// Registers `object` under a fresh name in the page's `category`
/// resources (`Font`, `ExtGState`, `XObject`) and returns the name.
pub fn register_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    object: Object,
) -> RedactorResult<Vec<u8>> {
    let mut resources = inherited(doc, page_id, b"Resources")
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok().cloned())
        .unwrap_or_else(Dictionary::new);

    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok().cloned())
        .unwrap_or_else(Dictionary::new);

    let name = (0..)
        .map(|i| format!("{}{}", prefix, i).into_bytes())
        .find(|candidate| !entries.has(candidate))
        .unwrap_or_else(|| prefix.as_bytes().to_vec());

    let id = doc.add_object(object);
    entries.set(name.clone(), Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
    page_dict_mut(doc, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Standard Helvetica with WinAnsi encoding.
pub fn helvetica() -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Graphics state with the given fill and stroke opacity.
pub fn translucent(alpha: f32) -> Object {
    Object::Dictionary(dictionary! {
        "Type" => "ExtGState",
        "ca" => alpha,
        "CA" => alpha,
    })
}

/// Small grey checker image used in place of redacted pictures.
pub fn placeholder_image() -> Object {
    const SIDE: usize = 8;
    let pixels: Vec<u8> = (0..SIDE * SIDE)
        .map(|i| if (i / SIDE + i % SIDE) % 2 == 0 { 0xc8 } else { 0xa0 })
        .collect();
    Object::Stream(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => SIDE as i64,
            "Height" => SIDE as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8i64,
        },
        pixels,
    ))
}

/// Appends an annotation to the page's `Annots` array.
pub fn add_annotation(doc: &mut Document, page_id: ObjectId, annotation: Dictionary) -> RedactorResult<()> {
    let mut annots = doc
        .get_dictionary(page_id)?
        .get(b"Annots")
        .ok()
        .map(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_array().ok().cloned())
        .unwrap_or_default();

    let id = doc.add_object(Object::Dictionary(annotation));
    annots.push(Object::Reference(id));
    page_dict_mut(doc, page_id)?.set("Annots", Object::Array(annots));
    Ok(())
}

fn page_dict_mut(doc: &mut Document, page_id: ObjectId) -> RedactorResult<&mut Dictionary> {
    doc.get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|e| RedactorError::redaction("page object is not a dictionary", Some(Box::new(e))))
}

fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = Some(page_id);
    let mut depth = 0;
    while let Some(id) = current {
        let dict = doc.get_dictionary(id).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value);
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
        if depth > 32 {
            return None;
        }
    }
    None
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}
