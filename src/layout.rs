//! Positioned page layout and header/footer normalization.
//!
//! A [`PdfLayout`] is built by interpreting each page's content stream
//! with `lopdf`: text-showing operators produce positioned [`Char`]s and
//! painted straight path segments produce ruling [`Edge`]s. Form XObjects
//! painted with `Do` are interpreted in place under their own matrix and
//! resources. Coordinates
//! are top-down page coordinates (`top` grows downwards from the page top),
//! which is what the table and section code reason in.
//!
//! [`normalize`] crops every page to a vertical band so running headers
//! and footers never reach the section locator, and keeps both the raw and
//! the cropped page objects for later spatial queries.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::error::ExtractError;

/// Characters whose vertical positions differ by at most this much share a line.
pub const Y_TOLERANCE: f64 = 3.0;
/// Horizontal gap above which two characters belong to different words.
pub const X_TOLERANCE: f64 = 3.0;

const DESCENT: f64 = 0.2;
const DEFAULT_GLYPH_WIDTH: f64 = 500.0;
const MAX_FORM_DEPTH: usize = 16;

/// Axis-aligned box in top-down page coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f64,
    pub top: f64,
    pub x1: f64,
    pub bottom: f64,
}

impl BBox {
    pub fn new(x0: f64, top: f64, x1: f64, bottom: f64) -> Self {
        Self {
            x0,
            top,
            x1,
            bottom,
        }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.top && y <= self.bottom
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Char {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
    pub size: f64,
}

impl Char {
    fn is_whitespace(&self) -> bool {
        self.text.chars().all(char::is_whitespace)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// A ruling segment. Horizontal edges have `top == bottom`; vertical edges
/// have `x0 == x1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub orientation: Orientation,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Edge {
    pub fn horizontal(x0: f64, x1: f64, y: f64) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            x0: x0.min(x1),
            x1: x0.max(x1),
            top: y,
            bottom: y,
        }
    }

    pub fn vertical(x: f64, top: f64, bottom: f64) -> Self {
        Self {
            orientation: Orientation::Vertical,
            x0: x,
            x1: x,
            top: top.min(bottom),
            bottom: top.max(bottom),
        }
    }

    pub fn length(&self) -> f64 {
        match self.orientation {
            Orientation::Horizontal => self.x1 - self.x0,
            Orientation::Vertical => self.bottom - self.top,
        }
    }
}

/// A line of words sharing a vertical position.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub words: Vec<Word>,
    pub top: f64,
    pub bottom: f64,
}

impl TextLine {
    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One page's characters and edges.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    /// 1-based page number in the source document.
    pub number: usize,
    pub width: f64,
    pub height: f64,
    /// The visible region; the full page unless cropped.
    pub bbox: BBox,
    pub chars: Vec<Char>,
    pub edges: Vec<Edge>,
}

impl PageLayout {
    pub fn new(number: usize, width: f64, height: f64) -> Self {
        Self {
            number,
            width,
            height,
            bbox: BBox::new(0.0, 0.0, width, height),
            chars: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Restricts the page to `bbox`. Characters are kept when their
    /// midpoint lies inside; edges are clipped and dropped when nothing
    /// remains.
    pub fn crop(&self, bbox: BBox) -> PageLayout {
        let bbox = BBox::new(
            bbox.x0.max(self.bbox.x0),
            bbox.top.max(self.bbox.top),
            bbox.x1.min(self.bbox.x1),
            bbox.bottom.min(self.bbox.bottom),
        );

        let chars = self
            .chars
            .iter()
            .filter(|c| bbox.contains_point((c.x0 + c.x1) / 2.0, (c.top + c.bottom) / 2.0))
            .cloned()
            .collect();

        let edges = self
            .edges
            .iter()
            .filter_map(|e| clip_edge(e, &bbox))
            .collect();

        PageLayout {
            number: self.number,
            width: self.width,
            height: self.height,
            bbox,
            chars,
            edges,
        }
    }

    /// Groups characters into words: a whitespace character ends a word,
    /// and so does a horizontal gap wider than [`X_TOLERANCE`].
    pub fn words(&self) -> Vec<Word> {
        let mut words = Vec::new();

        for line in cluster_by_top(&self.chars, |c| c.top) {
            let mut line = line;
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));

            let mut current: Option<Word> = None;
            for ch in line {
                if ch.is_whitespace() {
                    if let Some(w) = current.take() {
                        words.push(w);
                    }
                    continue;
                }
                match current.as_mut() {
                    Some(w) if ch.x0 - w.x1 <= X_TOLERANCE => {
                        w.text.push_str(&ch.text);
                        w.x1 = w.x1.max(ch.x1);
                        w.top = w.top.min(ch.top);
                        w.bottom = w.bottom.max(ch.bottom);
                    }
                    _ => {
                        if let Some(w) = current.take() {
                            words.push(w);
                        }
                        current = Some(Word {
                            text: ch.text.clone(),
                            x0: ch.x0,
                            x1: ch.x1,
                            top: ch.top,
                            bottom: ch.bottom,
                        });
                    }
                }
            }
            if let Some(w) = current {
                words.push(w);
            }
        }

        words
    }

    pub fn lines(&self) -> Vec<TextLine> {
        cluster_by_top(&self.words(), |w| w.top)
            .into_iter()
            .map(|mut words| {
                words.sort_by(|a, b| a.x0.total_cmp(&b.x0));
                let top = words.iter().map(|w| w.top).fold(f64::INFINITY, f64::min);
                let bottom = words
                    .iter()
                    .map(|w| w.bottom)
                    .fold(f64::NEG_INFINITY, f64::max);
                TextLine { words, top, bottom }
            })
            .collect()
    }

    /// Plain text of the page: one output line per visual line.
    pub fn extract_text(&self) -> String {
        self.lines()
            .iter()
            .map(TextLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Clusters items by vertical position; an item joins the current cluster
/// while its `top` is within [`Y_TOLERANCE`] of the previous item.
fn cluster_by_top<T: Clone>(items: &[T], top: impl Fn(&T) -> f64) -> Vec<Vec<T>> {
    let mut sorted: Vec<T> = items.to_vec();
    sorted.sort_by(|a, b| top(a).total_cmp(&top(b)));

    let mut clusters: Vec<Vec<T>> = Vec::new();
    let mut last_top = f64::NEG_INFINITY;
    for item in sorted {
        let t = top(&item);
        match clusters.last_mut() {
            Some(cluster) if t - last_top <= Y_TOLERANCE => cluster.push(item),
            _ => clusters.push(vec![item]),
        }
        last_top = t;
    }
    clusters
}

fn clip_edge(edge: &Edge, bbox: &BBox) -> Option<Edge> {
    match edge.orientation {
        Orientation::Horizontal => {
            if edge.top < bbox.top || edge.top > bbox.bottom {
                return None;
            }
            let x0 = edge.x0.max(bbox.x0);
            let x1 = edge.x1.min(bbox.x1);
            (x1 >= x0).then(|| Edge::horizontal(x0, x1, edge.top))
        }
        Orientation::Vertical => {
            if edge.x0 < bbox.x0 || edge.x0 > bbox.x1 {
                return None;
            }
            let top = edge.top.max(bbox.top);
            let bottom = edge.bottom.min(bbox.bottom);
            (bottom >= top).then(|| Edge::vertical(edge.x0, top, bottom))
        }
    }
}

// ============ Normalization ============

/// A document after header/footer cropping.
#[derive(Debug, Clone)]
pub struct NormalizedDocument {
    /// Uncropped pages, used for anchor-table recovery.
    pub raw_pages: Vec<PageLayout>,
    /// Pages cropped to the body band.
    pub pages: Vec<PageLayout>,
    page_texts: Vec<String>,
}

impl NormalizedDocument {
    /// Concatenated text of every page.
    pub fn text(&self) -> String {
        self.text_from(0)
    }

    /// Concatenated text of the pages from index `skip` onward. Pages
    /// without text contribute nothing.
    pub fn text_from(&self, skip: usize) -> String {
        self.page_texts
            .iter()
            .skip(skip)
            .filter(|t| !t.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Crops each page to `[margin_top, height - margin_bottom]` and extracts
/// its text. A page with plain-text fallback uses that text as is; it has
/// no positions, so its header and footer are not stripped.
pub fn normalize(layout: PdfLayout, extraction: &ExtractionConfig) -> NormalizedDocument {
    let pages: Vec<PageLayout> = layout
        .pages
        .iter()
        .map(|p| {
            p.crop(BBox::new(
                0.0,
                extraction.margin_top,
                p.width,
                p.height - extraction.margin_bottom,
            ))
        })
        .collect();
    let page_texts = pages
        .iter()
        .enumerate()
        .map(|(i, page)| match layout.fallback_texts.get(i).and_then(Option::as_ref) {
            Some(text) => text.clone(),
            None => page.extract_text(),
        })
        .collect();

    NormalizedDocument {
        raw_pages: layout.pages,
        pages,
        page_texts,
    }
}

/// Loads a PDF from disk and normalizes it.
pub fn load_document(
    path: &Path,
    extraction: &ExtractionConfig,
) -> Result<NormalizedDocument, ExtractError> {
    let layout = PdfLayout::open(path)?;
    Ok(normalize(layout, extraction))
}

// ============ Content stream interpretation ============

/// Every page of a PDF with positioned characters and ruling edges.
#[derive(Debug, Clone)]
pub struct PdfLayout {
    pub pages: Vec<PageLayout>,
    /// Per page, plain text from `pdf-extract` when interpretation found
    /// no positioned characters on that page.
    pub fallback_texts: Vec<Option<String>>,
}

impl PdfLayout {
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::FileNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractError> {
        let doc = Document::load_mem(bytes)?;
        let mut pages = Vec::new();

        for (number, page_id) in doc.get_pages() {
            let page = interpret_page(&doc, number as usize, page_id)?;
            debug!(
                page = number,
                chars = page.chars.len(),
                edges = page.edges.len(),
                "interpreted page"
            );
            pages.push(page);
        }

        let fallback_texts = plain_text_fallback(bytes, &pages);
        Ok(Self {
            pages,
            fallback_texts,
        })
    }
}

fn plain_text_fallback(bytes: &[u8], pages: &[PageLayout]) -> Vec<Option<String>> {
    let mut texts = vec![None; pages.len()];
    if pages.iter().all(|p| !p.chars.is_empty()) {
        return texts;
    }

    match pdf_extract::extract_text_from_mem_by_pages(bytes) {
        Ok(extracted) => {
            for (i, page) in pages.iter().enumerate() {
                if !page.chars.is_empty() {
                    continue;
                }
                if let Some(text) = extracted.get(i).filter(|t| !t.trim().is_empty()) {
                    warn!(page = page.number, "no positioned text; using plain-text fallback");
                    texts[i] = Some(text.clone());
                }
            }
        }
        Err(e) => debug!(error = %e, "plain-text fallback failed"),
    }
    texts
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn translate(tx: f64, ty: f64) -> Self {
        Matrix {
            e: tx,
            f: ty,
            ..Self::IDENTITY
        }
    }

    /// `self × other` in PDF row-vector convention.
    fn mul(&self, o: &Matrix) -> Matrix {
        Matrix {
            a: self.a * o.a + self.b * o.c,
            b: self.a * o.b + self.b * o.d,
            c: self.c * o.a + self.d * o.c,
            d: self.c * o.b + self.d * o.d,
            e: self.e * o.a + self.f * o.c + o.e,
            f: self.e * o.b + self.f * o.d + o.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x * self.a + y * self.c + self.e,
            x * self.b + y * self.d + self.f,
        )
    }

    fn from_operands(ops: &[Object]) -> Option<Matrix> {
        if ops.len() < 6 {
            return None;
        }
        Some(Matrix {
            a: number(&ops[0])?,
            b: number(&ops[1])?,
            c: number(&ops[2])?,
            d: number(&ops[3])?,
            e: number(&ops[4])?,
            f: number(&ops[5])?,
        })
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    char_spacing: f64,
    word_spacing: f64,
    hscale: f64,
    leading: f64,
    rise: f64,
    font: Option<Vec<u8>>,
    font_size: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            char_spacing: 0.0,
            word_spacing: 0.0,
            hscale: 1.0,
            leading: 0.0,
            rise: 0.0,
            font: None,
            font_size: 0.0,
        }
    }
}

/// Single-byte base encodings a simple font can name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum BaseEncoding {
    #[default]
    WinAnsi,
    MacRoman,
    Standard,
}

impl BaseEncoding {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"WinAnsiEncoding" => Some(Self::WinAnsi),
            b"MacRomanEncoding" => Some(Self::MacRoman),
            b"StandardEncoding" => Some(Self::Standard),
            _ => None,
        }
    }

    fn decode(self, byte: u8) -> Option<char> {
        match self {
            Self::WinAnsi => win_ansi(byte),
            Self::MacRoman => mac_roman(byte),
            Self::Standard => standard(byte),
        }
    }
}

/// Glyph metrics and unicode mapping for one font resource.
#[derive(Debug, Clone, Default)]
struct FontInfo {
    two_byte: bool,
    first_char: i64,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
    to_unicode: HashMap<u32, String>,
    encoding: BaseEncoding,
    /// `/Differences` overrides, already mapped from glyph names.
    differences: HashMap<u32, String>,
}

impl FontInfo {
    fn width(&self, code: u32) -> f64 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        let idx = code as i64 - self.first_char;
        if idx >= 0 {
            if let Some(w) = self.widths.get(idx as usize) {
                return *w;
            }
        }
        self.default_width
    }

    fn decode(&self, code: u32) -> String {
        if let Some(s) = self.to_unicode.get(&code) {
            return s.clone();
        }
        if self.two_byte {
            return char::from_u32(code).map(String::from).unwrap_or_default();
        }
        if let Some(s) = self.differences.get(&code) {
            return s.clone();
        }
        u8::try_from(code)
            .ok()
            .and_then(|b| self.encoding.decode(b))
            .map(String::from)
            .unwrap_or_default()
    }

    fn codes(&self, bytes: &[u8]) -> Vec<u32> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|c| match c {
                    [hi, lo] => u32::from(*hi) << 8 | u32::from(*lo),
                    [single] => u32::from(*single),
                    _ => 0,
                })
                .collect()
        } else {
            bytes.iter().map(|b| u32::from(*b)).collect()
        }
    }
}

struct PageInterpreter<'a> {
    doc: &'a Document,
    fonts: HashMap<Vec<u8>, FontInfo>,
    xobjects: HashMap<Vec<u8>, ObjectId>,
    /// Form XObjects currently being painted, innermost last.
    forms: Vec<ObjectId>,
    fallback_font: FontInfo,
    page: PageLayout,
    /// Lower-left corner of the media box.
    origin: (f64, f64),
    top_y: f64,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    tm: Matrix,
    tlm: Matrix,
    subpaths: Vec<Vec<(f64, f64)>>,
    closed: Vec<bool>,
}

fn interpret_page(
    doc: &Document,
    number: usize,
    page_id: ObjectId,
) -> Result<PageLayout, ExtractError> {
    let page_dict = doc.get_dictionary(page_id)?;
    let [llx, lly, urx, ury] = media_box(doc, page_dict);
    let resources = inherited(doc, page_dict, b"Resources").and_then(|o| o.as_dict().ok());
    let (fonts, xobjects) = resources
        .map(|r| (load_fonts(doc, r), load_xobjects(doc, r)))
        .unwrap_or_default();

    let content_bytes = doc.get_page_content(page_id)?;
    let content = Content::decode(&content_bytes)?;

    let mut interp = PageInterpreter {
        doc,
        fonts,
        xobjects,
        forms: Vec::new(),
        fallback_font: FontInfo {
            default_width: DEFAULT_GLYPH_WIDTH,
            ..FontInfo::default()
        },
        page: PageLayout::new(number, urx - llx, ury - lly),
        origin: (llx, lly),
        top_y: ury,
        state: GraphicsState::default(),
        stack: Vec::new(),
        tm: Matrix::IDENTITY,
        tlm: Matrix::IDENTITY,
        subpaths: Vec::new(),
        closed: Vec::new(),
    };

    interp.run(&content.operations);
    Ok(interp.page)
}

impl PageInterpreter<'_> {
    fn run(&mut self, operations: &[Operation]) {
        for op in operations {
            self.apply(&op.operator, &op.operands);
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.state.ctm = m.mul(&self.state.ctm);
                }
            }
            "BT" => {
                self.tm = Matrix::IDENTITY;
                self.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.state.font = Some(name.clone());
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    self.state.font_size = size;
                }
            }
            "Tc" => self.set_scalar(operands, |s, v| s.char_spacing = v),
            "Tw" => self.set_scalar(operands, |s, v| s.word_spacing = v),
            "Tz" => self.set_scalar(operands, |s, v| s.hscale = v / 100.0),
            "TL" => self.set_scalar(operands, |s, v| s.leading = v),
            "Ts" => self.set_scalar(operands, |s, v| s.rise = v),
            "Td" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.next_line(tx, ty);
                }
            }
            "TD" => {
                if let (Some(tx), Some(ty)) = (
                    operands.first().and_then(number),
                    operands.get(1).and_then(number),
                ) {
                    self.state.leading = -ty;
                    self.next_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.tm = m;
                    self.tlm = m;
                }
            }
            "T*" => self.next_line(0.0, -self.state.leading),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                if let Some(aw) = operands.first().and_then(number) {
                    self.state.word_spacing = aw;
                }
                if let Some(ac) = operands.get(1).and_then(number) {
                    self.state.char_spacing = ac;
                }
                self.next_line(0.0, -self.state.leading);
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(n) = number(other) {
                                    let tx = -n / 1000.0 * self.state.font_size * self.state.hscale;
                                    self.tm = Matrix::translate(tx, 0.0).mul(&self.tm);
                                }
                            }
                        }
                    }
                }
            }
            "m" => {
                if let Some(p) = self.point(operands, 0) {
                    self.subpaths.push(vec![p]);
                    self.closed.push(false);
                }
            }
            "l" => {
                if let Some(p) = self.point(operands, 0) {
                    if let Some(path) = self.subpaths.last_mut() {
                        path.push(p);
                    }
                }
            }
            "c" => self.curve_to(operands, 4),
            "v" | "y" => self.curve_to(operands, 2),
            "h" => {
                if let Some(c) = self.closed.last_mut() {
                    *c = true;
                }
            }
            "re" => self.rect(operands),
            "S" | "f" | "F" | "f*" | "B" | "B*" => self.paint(false),
            "s" | "b" | "b*" => self.paint(true),
            "n" => {
                self.subpaths.clear();
                self.closed.clear();
            }
            "Do" => {
                if let Some(Object::Name(name)) = operands.first() {
                    self.paint_form(name);
                }
            }
            _ => {}
        }
    }

    /// Interprets a Form XObject in place: the form matrix is prepended to
    /// the CTM and the form's resources shadow the current ones. Graphics
    /// and text state are restored afterwards. Image XObjects are ignored.
    fn paint_form(&mut self, name: &[u8]) {
        let doc = self.doc;
        let Some(&id) = self.xobjects.get(name) else {
            debug!(name = %String::from_utf8_lossy(name), "unknown xobject");
            return;
        };
        if self.forms.contains(&id) || self.forms.len() >= MAX_FORM_DEPTH {
            warn!(?id, "skipping recursive form xobject");
            return;
        }
        let Ok(stream) = doc.get_object(id).and_then(|o| o.as_stream()) else {
            return;
        };
        if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Form") {
            return;
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let content = match Content::decode(&data) {
            Ok(content) => content,
            Err(e) => {
                warn!(?id, error = %e, "undecodable form xobject");
                return;
            }
        };
        let matrix = stream
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|arr| Matrix::from_operands(arr))
            .unwrap_or(Matrix::IDENTITY);

        let shadowed = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .map(|r| {
                let mut fonts = self.fonts.clone();
                fonts.extend(load_fonts(doc, r));
                let mut xobjects = self.xobjects.clone();
                xobjects.extend(load_xobjects(doc, r));
                (
                    std::mem::replace(&mut self.fonts, fonts),
                    std::mem::replace(&mut self.xobjects, xobjects),
                )
            });

        let state = self.state.clone();
        let depth = self.stack.len();
        let (tm, tlm) = (self.tm, self.tlm);
        let subpaths = std::mem::take(&mut self.subpaths);
        let closed = std::mem::take(&mut self.closed);

        self.forms.push(id);
        self.state.ctm = matrix.mul(&self.state.ctm);
        self.run(&content.operations);
        self.forms.pop();

        self.stack.truncate(depth);
        self.state = state;
        self.tm = tm;
        self.tlm = tlm;
        self.subpaths = subpaths;
        self.closed = closed;
        if let Some((fonts, xobjects)) = shadowed {
            self.fonts = fonts;
            self.xobjects = xobjects;
        }
    }

    fn set_scalar(&mut self, operands: &[Object], set: impl Fn(&mut GraphicsState, f64)) {
        if let Some(v) = operands.first().and_then(number) {
            set(&mut self.state, v);
        }
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.tlm = Matrix::translate(tx, ty).mul(&self.tlm);
        self.tm = self.tlm;
    }

    fn show(&mut self, bytes: &[u8]) {
        let font = self
            .state
            .font
            .as_ref()
            .and_then(|name| self.fonts.get(name))
            .unwrap_or(&self.fallback_font);
        let size = self.state.font_size;
        let hscale = self.state.hscale;

        let mut glyphs = Vec::new();
        for code in font.codes(bytes) {
            let w0 = font.width(code) / 1000.0;
            let text = font.decode(code);
            let word_space = if !font.two_byte && code == 32 {
                self.state.word_spacing
            } else {
                0.0
            };
            glyphs.push((text, w0, word_space));
        }

        for (text, w0, word_space) in glyphs {
            let render = Matrix {
                a: size * hscale,
                b: 0.0,
                c: 0.0,
                d: size,
                e: 0.0,
                f: self.state.rise,
            }
            .mul(&self.tm)
            .mul(&self.state.ctm);

            let (x, y) = (render.e, render.f);
            let scale_x = (render.a * render.a + render.b * render.b).sqrt();
            let height = (render.c * render.c + render.d * render.d).sqrt();
            let glyph_width = w0 * scale_x;

            if !text.is_empty() && height > 0.0 {
                let x0 = x - self.origin.0;
                let baseline = self.top_y - y;
                let bottom = baseline + DESCENT * height;
                let top = bottom - height;
                self.page.chars.push(Char {
                    text,
                    x0,
                    x1: x0 + glyph_width,
                    top,
                    bottom,
                    size: height,
                });
            }

            let tx = (w0 * size + self.state.char_spacing + word_space) * hscale;
            self.tm = Matrix::translate(tx, 0.0).mul(&self.tm);
        }
    }

    fn point(&self, operands: &[Object], at: usize) -> Option<(f64, f64)> {
        let x = operands.get(at).and_then(number)?;
        let y = operands.get(at + 1).and_then(number)?;
        Some(self.state.ctm.apply(x, y))
    }

    fn curve_to(&mut self, operands: &[Object], end_at: usize) {
        // Curves never form table rulings; only the end point is tracked.
        if let Some(p) = self.point(operands, end_at) {
            self.subpaths.push(vec![p]);
            self.closed.push(false);
        }
    }

    fn rect(&mut self, operands: &[Object]) {
        let nums: Vec<f64> = operands.iter().filter_map(number).collect();
        if let [x, y, w, h] = nums[..] {
            let corners = [(x, y), (x + w, y), (x + w, y + h), (x, y + h)]
                .iter()
                .map(|(px, py)| self.state.ctm.apply(*px, *py))
                .collect();
            self.subpaths.push(corners);
            self.closed.push(true);
        }
    }

    fn paint(&mut self, close: bool) {
        let subpaths = std::mem::take(&mut self.subpaths);
        let closed = std::mem::take(&mut self.closed);

        for (points, was_closed) in subpaths.iter().zip(closed) {
            let mut segments: Vec<((f64, f64), (f64, f64))> =
                points.windows(2).map(|w| (w[0], w[1])).collect();
            if (close || was_closed) && points.len() > 2 {
                if let (Some(first), Some(last)) = (points.first(), points.last()) {
                    segments.push((*last, *first));
                }
            }
            for (p, q) in segments {
                if let Some(edge) = self.to_edge(p, q) {
                    self.page.edges.push(edge);
                }
            }
        }
    }

    /// Converts an axis-aligned user-space segment to a top-down edge.
    fn to_edge(&self, p: (f64, f64), q: (f64, f64)) -> Option<Edge> {
        let (x0, y0) = (p.0 - self.origin.0, self.top_y - p.1);
        let (x1, y1) = (q.0 - self.origin.0, self.top_y - q.1);
        if (y0 - y1).abs() < 0.5 && (x0 - x1).abs() >= 0.5 {
            Some(Edge::horizontal(x0, x1, (y0 + y1) / 2.0))
        } else if (x0 - x1).abs() < 0.5 && (y0 - y1).abs() >= 0.5 {
            Some(Edge::vertical((x0 + x1) / 2.0, y0, y1))
        } else {
            None
        }
    }
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Looks a key up on the page, then on its `Parent` chain.
fn inherited<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut current = dict;
    for _ in 0..32 {
        if let Ok(obj) = current.get(key) {
            return Some(resolve(doc, obj));
        }
        match current.get(b"Parent") {
            Ok(parent) => current = resolve(doc, parent).as_dict().ok()?,
            Err(_) => return None,
        }
    }
    None
}

fn media_box(doc: &Document, page: &Dictionary) -> [f64; 4] {
    let values: Vec<f64> = inherited(doc, page, b"MediaBox")
        .and_then(|o| o.as_array().ok())
        .map(|arr| arr.iter().filter_map(|o| number(resolve(doc, o))).collect())
        .unwrap_or_default();
    match values[..] {
        [a, b, c, d] => [a.min(c), b.min(d), a.max(c), b.max(d)],
        // US Letter.
        _ => [0.0, 0.0, 612.0, 792.0],
    }
}

fn load_fonts(doc: &Document, resources: &Dictionary) -> HashMap<Vec<u8>, FontInfo> {
    let mut fonts = HashMap::new();
    let Some(font_dict) = resources
        .get(b"Font")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
    else {
        return fonts;
    };

    for (name, obj) in font_dict.iter() {
        if let Ok(font) = resolve(doc, obj).as_dict() {
            fonts.insert(name.clone(), font_info(doc, font));
        }
    }
    fonts
}

fn load_xobjects(doc: &Document, resources: &Dictionary) -> HashMap<Vec<u8>, ObjectId> {
    resources
        .get(b"XObject")
        .ok()
        .and_then(|o| resolve(doc, o).as_dict().ok())
        .map(|dict| {
            dict.iter()
                .filter_map(|(name, obj)| match obj {
                    Object::Reference(id) => Some((name.clone(), *id)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn font_info(doc: &Document, font: &Dictionary) -> FontInfo {
    let subtype = match font.get(b"Subtype") {
        Ok(Object::Name(n)) => n.clone(),
        _ => Vec::new(),
    };
    let mut info = FontInfo {
        two_byte: subtype == b"Type0",
        default_width: DEFAULT_GLYPH_WIDTH,
        ..FontInfo::default()
    };

    if info.two_byte {
        let descendant = font
            .get(b"DescendantFonts")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|o| resolve(doc, o).as_dict().ok());
        if let Some(desc) = descendant {
            if let Some(dw) = desc.get(b"DW").ok().and_then(number) {
                info.default_width = dw;
            } else {
                info.default_width = 1000.0;
            }
            if let Ok(w) = desc.get(b"W") {
                if let Ok(arr) = resolve(doc, w).as_array() {
                    info.cid_widths = parse_cid_widths(doc, arr);
                }
            }
        }
    } else {
        info.first_char = font
            .get(b"FirstChar")
            .ok()
            .and_then(number)
            .map(|f| f as i64)
            .unwrap_or(0);
        if let Some(arr) = font
            .get(b"Widths")
            .ok()
            .and_then(|o| resolve(doc, o).as_array().ok())
        {
            info.widths = arr
                .iter()
                .map(|o| number(resolve(doc, o)).unwrap_or(0.0))
                .collect();
        }
        let missing = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|o| resolve(doc, o).as_dict().ok())
            .and_then(|d| d.get(b"MissingWidth").ok())
            .and_then(number);
        if let Some(mw) = missing.filter(|w| *w > 0.0) {
            info.default_width = mw;
        }
        read_encoding(doc, font, &mut info);
    }

    if let Ok(obj) = font.get(b"ToUnicode") {
        if let Ok(stream) = resolve(doc, obj).as_stream() {
            match stream.decompressed_content() {
                Ok(data) => info.to_unicode = parse_to_unicode(&data),
                Err(_) => info.to_unicode = parse_to_unicode(&stream.content),
            }
        }
    }

    info
}

/// Applies a simple font's `/Encoding`: a base encoding name, or a
/// dictionary with an optional `BaseEncoding` and `Differences`. Without
/// one the font is read as WinAnsi.
fn read_encoding(doc: &Document, font: &Dictionary, info: &mut FontInfo) {
    match font.get(b"Encoding").ok().map(|o| resolve(doc, o)) {
        Some(Object::Name(name)) => {
            if let Some(base) = BaseEncoding::from_name(name) {
                info.encoding = base;
            }
        }
        Some(Object::Dictionary(dict)) => {
            if let Ok(Object::Name(name)) = dict.get(b"BaseEncoding") {
                if let Some(base) = BaseEncoding::from_name(name) {
                    info.encoding = base;
                }
            }
            if let Some(arr) = dict
                .get(b"Differences")
                .ok()
                .and_then(|o| resolve(doc, o).as_array().ok())
            {
                info.differences = parse_differences(doc, arr);
            }
        }
        _ => {}
    }
}

/// `[code name name ... code name ...]`: each name takes the next code.
/// Names with no known unicode value are left to the base encoding.
fn parse_differences(doc: &Document, arr: &[Object]) -> HashMap<u32, String> {
    let mut map = HashMap::new();
    let mut code: Option<u32> = None;
    for obj in arr {
        match resolve(doc, obj) {
            Object::Integer(i) => code = u32::try_from(*i).ok(),
            Object::Name(name) => {
                if let Some(c) = code {
                    if let Some(text) = glyph_text(&String::from_utf8_lossy(name)) {
                        map.insert(c, text);
                    }
                    code = Some(c + 1);
                }
            }
            _ => {}
        }
    }
    map
}

/// Unicode text for a glyph name: `uniXXXX`, `uXXXX[XX]`, single letters,
/// ligatures joined with `_`, and the Latin names a Spanish guide uses.
/// Suffixes such as `.sc` are ignored.
fn glyph_text(name: &str) -> Option<String> {
    let name = name.split('.').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }

    if let Some(hex) = name.strip_prefix("uni") {
        if hex.len() >= 4 && hex.len() % 4 == 0 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(utf16_hex(hex));
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return hex_code(hex).and_then(char::from_u32).map(String::from);
        }
    }
    if name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(name.to_string());
    }
    if name.contains('_') {
        return name.split('_').map(glyph_text).collect();
    }

    GLYPH_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| text.to_string())
}

const GLYPH_NAMES: &[(&str, &str)] = &[
    ("space", " "),
    ("nbspace", "\u{a0}"),
    ("nonbreakingspace", "\u{a0}"),
    ("exclam", "!"),
    ("quotedbl", "\""),
    ("numbersign", "#"),
    ("dollar", "$"),
    ("percent", "%"),
    ("ampersand", "&"),
    ("quotesingle", "'"),
    ("parenleft", "("),
    ("parenright", ")"),
    ("asterisk", "*"),
    ("plus", "+"),
    ("comma", ","),
    ("hyphen", "-"),
    ("minus", "\u{2212}"),
    ("period", "."),
    ("slash", "/"),
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("colon", ":"),
    ("semicolon", ";"),
    ("less", "<"),
    ("equal", "="),
    ("greater", ">"),
    ("question", "?"),
    ("at", "@"),
    ("bracketleft", "["),
    ("backslash", "\\"),
    ("bracketright", "]"),
    ("asciicircum", "^"),
    ("underscore", "_"),
    ("grave", "`"),
    ("braceleft", "{"),
    ("bar", "|"),
    ("braceright", "}"),
    ("asciitilde", "~"),
    ("quoteleft", "\u{2018}"),
    ("quoteright", "\u{2019}"),
    ("quotesinglbase", "\u{201a}"),
    ("quotedblleft", "\u{201c}"),
    ("quotedblright", "\u{201d}"),
    ("quotedblbase", "\u{201e}"),
    ("endash", "\u{2013}"),
    ("emdash", "\u{2014}"),
    ("bullet", "\u{2022}"),
    ("ellipsis", "\u{2026}"),
    ("dagger", "\u{2020}"),
    ("daggerdbl", "\u{2021}"),
    ("perthousand", "\u{2030}"),
    ("trademark", "\u{2122}"),
    ("Euro", "\u{20ac}"),
    ("florin", "\u{192}"),
    ("fraction", "\u{2044}"),
    ("circumflex", "\u{2c6}"),
    ("tilde", "\u{2dc}"),
    ("guillemotleft", "\u{ab}"),
    ("guillemotright", "\u{bb}"),
    ("guilsinglleft", "\u{2039}"),
    ("guilsinglright", "\u{203a}"),
    ("exclamdown", "\u{a1}"),
    ("cent", "\u{a2}"),
    ("sterling", "\u{a3}"),
    ("currency", "\u{a4}"),
    ("yen", "\u{a5}"),
    ("brokenbar", "\u{a6}"),
    ("section", "\u{a7}"),
    ("dieresis", "\u{a8}"),
    ("copyright", "\u{a9}"),
    ("ordfeminine", "\u{aa}"),
    ("logicalnot", "\u{ac}"),
    ("registered", "\u{ae}"),
    ("macron", "\u{af}"),
    ("degree", "\u{b0}"),
    ("plusminus", "\u{b1}"),
    ("twosuperior", "\u{b2}"),
    ("threesuperior", "\u{b3}"),
    ("acute", "\u{b4}"),
    ("mu", "\u{b5}"),
    ("paragraph", "\u{b6}"),
    ("periodcentered", "\u{b7}"),
    ("cedilla", "\u{b8}"),
    ("onesuperior", "\u{b9}"),
    ("ordmasculine", "\u{ba}"),
    ("onequarter", "\u{bc}"),
    ("onehalf", "\u{bd}"),
    ("threequarters", "\u{be}"),
    ("questiondown", "\u{bf}"),
    ("multiply", "\u{d7}"),
    ("divide", "\u{f7}"),
    ("ff", "ff"),
    ("fi", "fi"),
    ("fl", "fl"),
    ("ffi", "ffi"),
    ("ffl", "ffl"),
    ("Agrave", "\u{c0}"),
    ("Aacute", "\u{c1}"),
    ("Acircumflex", "\u{c2}"),
    ("Atilde", "\u{c3}"),
    ("Adieresis", "\u{c4}"),
    ("Aring", "\u{c5}"),
    ("AE", "\u{c6}"),
    ("Ccedilla", "\u{c7}"),
    ("Egrave", "\u{c8}"),
    ("Eacute", "\u{c9}"),
    ("Ecircumflex", "\u{ca}"),
    ("Edieresis", "\u{cb}"),
    ("Igrave", "\u{cc}"),
    ("Iacute", "\u{cd}"),
    ("Icircumflex", "\u{ce}"),
    ("Idieresis", "\u{cf}"),
    ("Eth", "\u{d0}"),
    ("Ntilde", "\u{d1}"),
    ("Ograve", "\u{d2}"),
    ("Oacute", "\u{d3}"),
    ("Ocircumflex", "\u{d4}"),
    ("Otilde", "\u{d5}"),
    ("Odieresis", "\u{d6}"),
    ("Oslash", "\u{d8}"),
    ("Ugrave", "\u{d9}"),
    ("Uacute", "\u{da}"),
    ("Ucircumflex", "\u{db}"),
    ("Udieresis", "\u{dc}"),
    ("Yacute", "\u{dd}"),
    ("Thorn", "\u{de}"),
    ("germandbls", "\u{df}"),
    ("agrave", "\u{e0}"),
    ("aacute", "\u{e1}"),
    ("acircumflex", "\u{e2}"),
    ("atilde", "\u{e3}"),
    ("adieresis", "\u{e4}"),
    ("aring", "\u{e5}"),
    ("ae", "\u{e6}"),
    ("ccedilla", "\u{e7}"),
    ("egrave", "\u{e8}"),
    ("eacute", "\u{e9}"),
    ("ecircumflex", "\u{ea}"),
    ("edieresis", "\u{eb}"),
    ("igrave", "\u{ec}"),
    ("iacute", "\u{ed}"),
    ("icircumflex", "\u{ee}"),
    ("idieresis", "\u{ef}"),
    ("eth", "\u{f0}"),
    ("ntilde", "\u{f1}"),
    ("ograve", "\u{f2}"),
    ("oacute", "\u{f3}"),
    ("ocircumflex", "\u{f4}"),
    ("otilde", "\u{f5}"),
    ("odieresis", "\u{f6}"),
    ("oslash", "\u{f8}"),
    ("ugrave", "\u{f9}"),
    ("uacute", "\u{fa}"),
    ("ucircumflex", "\u{fb}"),
    ("udieresis", "\u{fc}"),
    ("yacute", "\u{fd}"),
    ("thorn", "\u{fe}"),
    ("ydieresis", "\u{ff}"),
    ("dotlessi", "\u{131}"),
    ("Lslash", "\u{141}"),
    ("lslash", "\u{142}"),
    ("OE", "\u{152}"),
    ("oe", "\u{153}"),
    ("Scaron", "\u{160}"),
    ("scaron", "\u{161}"),
    ("Ydieresis", "\u{178}"),
    ("Zcaron", "\u{17d}"),
    ("zcaron", "\u{17e}"),
];

/// Parses a CID font `W` array: `c [w1 w2 ...]` and `c_first c_last w`.
fn parse_cid_widths(doc: &Document, arr: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while i < arr.len() {
        let Some(first) = number(resolve(doc, &arr[i])) else {
            break;
        };
        match arr.get(i + 1).map(|o| resolve(doc, o)) {
            Some(Object::Array(list)) => {
                for (offset, w) in list.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(first as u32 + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let last = number(last).unwrap_or(first);
                let w = arr
                    .get(i + 2)
                    .and_then(|o| number(resolve(doc, o)))
                    .unwrap_or(DEFAULT_GLYPH_WIDTH);
                for code in first as u32..=last as u32 {
                    widths.insert(code, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Extracts `bfchar` and `bfrange` mappings from a ToUnicode CMap.
fn parse_to_unicode(data: &[u8]) -> HashMap<u32, String> {
    let text = String::from_utf8_lossy(data);
    let mut map = HashMap::new();

    for block in sections(&text, "beginbfchar", "endbfchar") {
        let hex = hex_tokens(block);
        for pair in hex.chunks(2) {
            if let [src, dst] = pair {
                if let Some(code) = hex_code(src) {
                    map.insert(code, utf16_hex(dst));
                }
            }
        }
    }

    for block in sections(&text, "beginbfrange", "endbfrange") {
        for line in block.lines() {
            let hex = hex_tokens(line);
            if hex.len() < 3 {
                continue;
            }
            let (Some(lo), Some(hi)) = (hex_code(&hex[0]), hex_code(&hex[1])) else {
                continue;
            };
            if line.contains('[') {
                for (offset, dst) in hex[2..].iter().enumerate() {
                    map.insert(lo + offset as u32, utf16_hex(dst));
                }
            } else if let Some(base) = hex_code(&hex[2]) {
                for code in lo..=hi.min(lo + 0xFFFF) {
                    if let Some(ch) = char::from_u32(base + (code - lo)) {
                        map.insert(code, ch.to_string());
                    }
                }
            }
        }
    }

    map
}

fn sections<'a>(text: &'a str, begin: &str, end: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(begin) {
        let after = &rest[start + begin.len()..];
        match after.find(end) {
            Some(stop) => {
                out.push(&after[..stop]);
                rest = &after[stop + end.len()..];
            }
            None => break,
        }
    }
    out
}

fn hex_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    for ch in text.chars() {
        if ch == '<' {
            current = Some(String::new());
        } else if ch == '>' {
            if let Some(t) = current.take() {
                tokens.push(t);
            }
        } else if let Some(t) = current.as_mut() {
            if ch.is_ascii_hexdigit() {
                t.push(ch);
            }
        }
    }
    tokens
}

fn hex_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex, 16).ok()
}

fn utf16_hex(hex: &str) -> String {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks(4)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .filter_map(|s| u16::from_str_radix(s, 16).ok())
        .collect();
    String::from_utf16_lossy(&units)
}

/// WinAnsiEncoding; identical to Latin-1 outside 0x80..=0x9F, where five
/// codes are undefined.
fn win_ansi(byte: u8) -> Option<char> {
    Some(match byte {
        0x80 => '\u{20ac}',
        0x82 => '\u{201a}',
        0x83 => '\u{192}',
        0x84 => '\u{201e}',
        0x85 => '\u{2026}',
        0x86 => '\u{2020}',
        0x87 => '\u{2021}',
        0x88 => '\u{2c6}',
        0x89 => '\u{2030}',
        0x8A => '\u{160}',
        0x8B => '\u{2039}',
        0x8C => '\u{152}',
        0x8E => '\u{17d}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201c}',
        0x94 => '\u{201d}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0x98 => '\u{2dc}',
        0x99 => '\u{2122}',
        0x9A => '\u{161}',
        0x9B => '\u{203a}',
        0x9C => '\u{153}',
        0x9E => '\u{17e}',
        0x9F => '\u{178}',
        0x81 | 0x8D | 0x8F | 0x90 | 0x9D => return None,
        b => char::from(b),
    })
}

const MAC_ROMAN_HIGH: [char; 128] = [
    'Ä', 'Å', 'Ç', 'É', 'Ñ', 'Ö', 'Ü', 'á', 'à', 'â', 'ä', 'ã', 'å', 'ç', 'é', 'è',
    'ê', 'ë', 'í', 'ì', 'î', 'ï', 'ñ', 'ó', 'ò', 'ô', 'ö', 'õ', 'ú', 'ù', 'û', 'ü',
    '†', '°', '¢', '£', '§', '•', '¶', 'ß', '®', '©', '™', '´', '¨', '≠', 'Æ', 'Ø',
    '∞', '±', '≤', '≥', '¥', 'µ', '∂', '∑', '∏', 'π', '∫', 'ª', 'º', 'Ω', 'æ', 'ø',
    '¿', '¡', '¬', '√', 'ƒ', '≈', '∆', '«', '»', '…', '\u{a0}', 'À', 'Ã', 'Õ', 'Œ', 'œ',
    '\u{2013}', '\u{2014}', '“', '”', '‘', '’', '÷', '◊', 'ÿ', 'Ÿ', '⁄', '¤', '‹', '›', 'ﬁ', 'ﬂ',
    '‡', '·', '‚', '„', '‰', 'Â', 'Ê', 'Á', 'Ë', 'È', 'Í', 'Î', 'Ï', 'Ì', 'Ó', 'Ô',
    '\u{0}', 'Ò', 'Ú', 'Û', 'Ù', 'ı', 'ˆ', '˜', '¯', '˘', '˙', '˚', '¸', '˝', '˛', 'ˇ',
];

/// MacRomanEncoding. 0xF0 is undefined in PDF.
fn mac_roman(byte: u8) -> Option<char> {
    match byte {
        0xF0 => None,
        0x80..=0xFF => Some(MAC_ROMAN_HIGH[usize::from(byte - 0x80)]),
        b => Some(char::from(b)),
    }
}

/// Adobe StandardEncoding. It carries no accented letters; fonts using it
/// reach those through `/Differences`.
fn standard(byte: u8) -> Option<char> {
    Some(match byte {
        0x27 => '\u{2019}',
        0x60 => '\u{2018}',
        0x00..=0x7E => char::from(byte),
        0xA1 => '¡',
        0xA2 => '¢',
        0xA3 => '£',
        0xA4 => '⁄',
        0xA5 => '¥',
        0xA6 => 'ƒ',
        0xA7 => '§',
        0xA8 => '¤',
        0xA9 => '\'',
        0xAA => '“',
        0xAB => '«',
        0xAC => '‹',
        0xAD => '›',
        0xAE => 'ﬁ',
        0xAF => 'ﬂ',
        0xB1 => '\u{2013}',
        0xB2 => '†',
        0xB3 => '‡',
        0xB4 => '·',
        0xB6 => '¶',
        0xB7 => '•',
        0xB8 => '‚',
        0xB9 => '„',
        0xBA => '”',
        0xBB => '»',
        0xBC => '…',
        0xBD => '‰',
        0xBF => '¿',
        0xC1 => '`',
        0xC2 => '´',
        0xC3 => 'ˆ',
        0xC4 => '˜',
        0xC5 => '¯',
        0xC6 => '˘',
        0xC7 => '˙',
        0xC8 => '¨',
        0xCA => '˚',
        0xCB => '¸',
        0xCD => '˝',
        0xCE => '˛',
        0xCF => 'ˇ',
        0xD0 => '\u{2014}',
        0xE1 => 'Æ',
        0xE3 => 'ª',
        0xE8 => 'Ł',
        0xE9 => 'Ø',
        0xEA => 'Œ',
        0xEB => 'º',
        0xF1 => 'æ',
        0xF5 => 'ı',
        0xF8 => 'ł',
        0xF9 => 'ø',
        0xFA => 'œ',
        0xFB => 'ß',
        _ => return None,
    })
}

#[cfg(test)]
#[path = "../tests/common/guide_pdf.rs"]
pub(crate) mod fixtures;

#[cfg(test)]
mod tests {
    use super::fixtures::{build_form_pdf, build_pdf, rect, text};
    use super::*;
    use lopdf::{dictionary, Stream};

    fn ch(text: &str, x0: f64, top: f64) -> Char {
        Char {
            text: text.to_string(),
            x0,
            x1: x0 + 5.0,
            top,
            bottom: top + 10.0,
            size: 10.0,
        }
    }

    fn page_with(chars: Vec<Char>) -> PageLayout {
        let mut page = PageLayout::new(1, 595.0, 842.0);
        page.chars = chars;
        page
    }

    #[test]
    fn test_words_split_on_whitespace_and_gaps() {
        let page = page_with(vec![
            ch("a", 10.0, 100.0),
            ch("b", 15.0, 100.5),
            ch(" ", 20.0, 100.0),
            ch("c", 25.0, 100.0),
            ch("d", 40.0, 101.0),
        ]);
        let words: Vec<String> = page.words().into_iter().map(|w| w.text).collect();
        assert_eq!(words, vec!["ab", "c", "d"]);
    }

    #[test]
    fn test_lines_group_by_top_and_sort_by_x() {
        let page = page_with(vec![
            ch("z", 50.0, 200.0),
            ch("y", 10.0, 101.0),
            ch("x", 10.0, 100.0),
        ]);
        let lines = page.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text(), "xy");
        assert_eq!(lines[1].text(), "z");
    }

    #[test]
    fn test_crop_keeps_chars_by_midpoint_and_clips_edges() {
        let mut page = page_with(vec![ch("h", 10.0, 20.0), ch("b", 10.0, 300.0)]);
        page.edges = vec![
            Edge::vertical(100.0, 0.0, 842.0),
            Edge::horizontal(0.0, 595.0, 30.0),
        ];
        let cropped = page.crop(BBox::new(0.0, 60.0, 595.0, 782.0));
        assert_eq!(cropped.chars.len(), 1);
        assert_eq!(cropped.chars[0].text, "b");
        assert_eq!(cropped.edges, vec![Edge::vertical(100.0, 60.0, 782.0)]);
    }

    #[test]
    fn test_interpreter_positions_text_top_down() {
        let pdf = build_pdf(&[vec![text(100, 200, 10, "Hola")]]);
        let layout = PdfLayout::from_bytes(&pdf).unwrap();
        assert_eq!(layout.pages.len(), 1);
        let page = &layout.pages[0];
        assert_eq!(page.width, 595.0);
        let word = &page.words()[0];
        assert_eq!(word.text, "Hola");
        assert!((word.x0 - 100.0).abs() < 0.01);
        assert!(word.top < 200.0 && word.bottom > 200.0);
    }

    #[test]
    fn test_interpreter_decodes_latin1_accents() {
        let pdf = build_pdf(&[vec![text(50, 300, 10, "Descripción")]]);
        let layout = PdfLayout::from_bytes(&pdf).unwrap();
        assert_eq!(layout.pages[0].extract_text(), "Descripción");
    }

    #[test]
    fn test_interpreter_emits_rect_edges() {
        let pdf = build_pdf(&[vec![rect(50, 100, 200, 20)]]);
        let layout = PdfLayout::from_bytes(&pdf).unwrap();
        let edges = &layout.pages[0].edges;
        assert_eq!(edges.len(), 4);
        let horizontal: Vec<&Edge> = edges
            .iter()
            .filter(|e| e.orientation == Orientation::Horizontal)
            .collect();
        assert_eq!(horizontal.len(), 2);
        assert!(horizontal.iter().any(|e| (e.top - 100.0).abs() < 0.01));
        assert!(horizontal.iter().any(|e| (e.top - 120.0).abs() < 0.01));
    }

    #[test]
    fn test_normalize_strips_header_and_footer_bands() {
        let pdf = build_pdf(&[
            vec![
                text(50, 30, 9, "Cabecera"),
                text(50, 400, 10, "Cuerpo"),
                text(50, 820, 9, "Pie"),
            ],
            vec![],
            vec![text(50, 400, 10, "Tercera")],
        ]);
        let layout = PdfLayout::from_bytes(&pdf).unwrap();
        let doc = normalize(layout, &ExtractionConfig::default());
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.text(), "Cuerpo\nTercera");
        assert_eq!(doc.text_from(2), "Tercera");
        assert_eq!(doc.raw_pages[0].extract_text(), "Cabecera\nCuerpo\nPie");
    }

    #[test]
    fn test_open_missing_file() {
        let err = PdfLayout::open(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound(_)));
    }

    #[test]
    fn test_unreadable_pdf_is_pdf_error() {
        let err = PdfLayout::from_bytes(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn test_form_xobject_content_is_interpreted() {
        let items = vec![text(100, 200, 10, "Hola"), rect(50, 300, 200, 20)];
        let plain = PdfLayout::from_bytes(&build_pdf(&[items])).unwrap();

        let items = vec![text(100, 200, 10, "Hola"), rect(50, 300, 200, 20)];
        let form = PdfLayout::from_bytes(&build_form_pdf(&[items], [1, 0, 0, 1, 0, 0])).unwrap();

        assert_eq!(form.pages[0].extract_text(), "Hola");
        assert_eq!(form.pages[0].chars, plain.pages[0].chars);
        assert_eq!(form.pages[0].edges, plain.pages[0].edges);
    }

    #[test]
    fn test_form_matrix_moves_content() {
        // Moves right by 10 and up by 20 in PDF space.
        let items = vec![text(100, 200, 10, "Hola")];
        let layout = PdfLayout::from_bytes(&build_form_pdf(&[items], [1, 0, 0, 1, 10, 20])).unwrap();
        let word = &layout.pages[0].words()[0];
        assert!((word.x0 - 110.0).abs() < 0.01);
        assert!(word.top < 180.0 && word.bottom > 180.0);
    }

    #[test]
    fn test_self_referencing_form_terminates() {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let form_id = doc.new_object_id();
        let body = b"BT /F1 10 Tf 50 500 Td (Bucle) Tj ET /Fm0 Do".to_vec();
        doc.objects.insert(
            form_id,
            Object::Stream(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Form",
                    "BBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
                    "Resources" => dictionary! {
                        "Font" => dictionary! { "F1" => font_id },
                        "XObject" => dictionary! { "Fm0" => form_id },
                    },
                },
                body,
            )),
        );
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"/Fm0 Do".to_vec()));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Integer(595), Object::Integer(842)],
            "Resources" => dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => Object::Integer(1),
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();

        let layout = PdfLayout::from_bytes(&bytes).unwrap();
        assert_eq!(layout.pages[0].extract_text(), "Bucle");
    }

    #[test]
    fn test_fallback_text_fills_blank_pages_after_skip() {
        let mut cover = PageLayout::new(1, 595.0, 842.0);
        cover.chars = vec![ch("P", 50.0, 300.0)];
        let layout = PdfLayout {
            pages: vec![
                cover,
                PageLayout::new(2, 595.0, 842.0),
                PageLayout::new(3, 595.0, 842.0),
            ],
            fallback_texts: vec![
                None,
                Some("Índice".to_string()),
                Some("5.2. Temario de la asignatura\n1. Introducción".to_string()),
            ],
        };
        let doc = normalize(layout, &ExtractionConfig::default());
        assert_eq!(
            doc.text(),
            "P\nÍndice\n5.2. Temario de la asignatura\n1. Introducción"
        );
        assert_eq!(doc.text_from(2), "5.2. Temario de la asignatura\n1. Introducción");
    }

    #[test]
    fn test_differences_override_base_encoding() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "ABCDEF+Arial",
            "Encoding" => dictionary! {
                "Type" => "Encoding",
                "BaseEncoding" => "WinAnsiEncoding",
                "Differences" => vec![
                    Object::Integer(65),
                    "aacute".into(),
                    "ntilde".into(),
                    Object::Integer(100),
                    "uni00F3".into(),
                    "f_i".into(),
                    "g17".into(),
                ],
            },
        };
        let info = font_info(&doc, &font);
        assert_eq!(info.decode(65), "á");
        assert_eq!(info.decode(66), "ñ");
        assert_eq!(info.decode(67), "C");
        assert_eq!(info.decode(100), "ó");
        assert_eq!(info.decode(101), "fi");
        assert_eq!(info.decode(102), "f");
    }

    #[test]
    fn test_named_base_encodings() {
        let doc = Document::with_version("1.5");
        let mac = font_info(
            &doc,
            &dictionary! { "Subtype" => "TrueType", "Encoding" => "MacRomanEncoding" },
        );
        assert_eq!(mac.decode(0x87), "á");
        assert_eq!(mac.decode(0x97), "ó");
        assert_eq!(mac.decode(0x96), "ñ");
        assert_eq!(mac.decode(0xF0), "");

        let standard = font_info(
            &doc,
            &dictionary! { "Subtype" => "Type1", "Encoding" => "StandardEncoding" },
        );
        assert_eq!(standard.decode(0x27), "\u{2019}");
        assert_eq!(standard.decode(0xE9), "Ø");
        assert_eq!(standard.decode(0xF3), "");
    }

    #[test]
    fn test_win_ansi_covers_the_0x80_block() {
        assert_eq!(win_ansi(0x83), Some('ƒ'));
        assert_eq!(win_ansi(0x8A), Some('Š'));
        assert_eq!(win_ansi(0x9C), Some('œ'));
        assert_eq!(win_ansi(0x9F), Some('Ÿ'));
        assert_eq!(win_ansi(0x81), None);
        assert_eq!(win_ansi(0xF3), Some('ó'));
    }

    #[test]
    fn test_to_unicode_cmap_parsing() {
        let cmap = b"beginbfchar\n<0003> <0020>\n<0011> <00F3>\nendbfchar\nbeginbfrange\n<0024> <0026> <0041>\nendbfrange";
        let map = parse_to_unicode(cmap);
        assert_eq!(map.get(&0x11).map(String::as_str), Some("ó"));
        assert_eq!(map.get(&0x25).map(String::as_str), Some("B"));
        assert_eq!(map.get(&0x03).map(String::as_str), Some(" "));
    }
}
