//! Minimal PDF writer for tests, plus a five-page guide in the
//! institutional layout. Shared by unit and integration tests.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};

pub enum Item {
    /// Text with its baseline at `(x, y)` in top-down coordinates.
    Text { x: i64, y: i64, size: i64, text: String },
    /// Stroked rectangle in top-down coordinates.
    Rect { x: i64, y: i64, w: i64, h: i64 },
}

pub fn text(x: i64, y: i64, size: i64, text: &str) -> Item {
    Item::Text {
        x,
        y,
        size,
        text: text.to_string(),
    }
}

pub fn rect(x: i64, y: i64, w: i64, h: i64) -> Item {
    Item::Rect { x, y, w, h }
}

fn latin1(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

fn int(n: i64) -> Object {
    Object::Integer(n)
}

pub const PAGE_HEIGHT: i64 = 842;

/// Builds an A4 PDF; one inner vector per page.
pub fn build_pdf(pages: &[Vec<Item>]) -> Vec<u8> {
    build(pages, None)
}

/// Like [`build_pdf`], but each page's drawing lives in a Form XObject
/// with the given matrix, and the page itself only paints `/Fm0 Do`.
pub fn build_form_pdf(pages: &[Vec<Item>], matrix: [i64; 6]) -> Vec<u8> {
    build(pages, Some(matrix))
}

fn build(pages: &[Vec<Item>], form_matrix: Option<[i64; 6]>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for items in pages {
        let mut ops = Vec::new();
        for item in items {
            match item {
                Item::Text { x, y, size, text } => {
                    ops.push(Operation::new("BT", vec![]));
                    ops.push(Operation::new("Tf", vec!["F1".into(), int(*size)]));
                    ops.push(Operation::new("Td", vec![int(*x), int(PAGE_HEIGHT - y)]));
                    ops.push(Operation::new(
                        "Tj",
                        vec![Object::String(latin1(text), StringFormat::Literal)],
                    ));
                    ops.push(Operation::new("ET", vec![]));
                }
                Item::Rect { x, y, w, h } => {
                    ops.push(Operation::new(
                        "re",
                        vec![int(*x), int(PAGE_HEIGHT - y - h), int(*w), int(*h)],
                    ));
                    ops.push(Operation::new("S", vec![]));
                }
            }
        }
        let body = Content { operations: ops }.encode().unwrap();
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        };
        let content_id = match form_matrix {
            None => doc.add_object(Stream::new(dictionary! {}, body)),
            Some(matrix) => {
                let form_id = doc.add_object(Stream::new(
                    dictionary! {
                        "Type" => "XObject",
                        "Subtype" => "Form",
                        "BBox" => vec![int(0), int(0), int(595), int(PAGE_HEIGHT)],
                        "Matrix" => matrix.iter().map(|v| int(*v)).collect::<Vec<Object>>(),
                        "Resources" => resources_id,
                    },
                    body,
                ));
                page.set(
                    "Resources",
                    dictionary! { "XObject" => dictionary! { "Fm0" => form_id } },
                );
                let paint = Content {
                    operations: vec![
                        Operation::new("q", vec![]),
                        Operation::new("Do", vec!["Fm0".into()]),
                        Operation::new("Q", vec![]),
                    ],
                };
                doc.add_object(Stream::new(dictionary! {}, paint.encode().unwrap()))
            }
        };
        page.set("Contents", content_id);
        let page_id = doc.add_object(page);
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
            "MediaBox" => vec![int(0), int(0), int(595), int(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// A ruled grid whose cells are `col_widths` wide and `row_height` tall,
/// with each cell's text placed inside it.
pub fn grid(x: i64, y: i64, col_widths: &[i64], row_height: i64, rows: &[&[&str]]) -> Vec<Item> {
    let mut items = Vec::new();
    let mut top = y;
    for row in rows {
        let mut left = x;
        for (i, w) in col_widths.iter().enumerate() {
            items.push(rect(left, top, *w, row_height));
            if let Some(cell) = row.get(i) {
                if !cell.is_empty() {
                    items.push(text(left + 3, top + row_height - 6, 9, cell));
                }
            }
            left += w;
        }
        top += row_height;
    }
    items
}

pub fn sample_guide() -> Vec<u8> {
    let cover = vec![text(50, 300, 16, "Guía de aprendizaje")];
    let index = vec![text(50, 300, 12, "Índice")];

    let mut metadata = vec![
        text(50, 90, 12, "1. Datos descriptivos"),
        text(50, 110, 11, "1.1. Datos de la asignatura"),
    ];
    metadata.extend(grid(
        50,
        120,
        &[180, 300],
        20,
        &[
            &["Nombre de la asignatura", "105000006 - Sistemas Operativos"],
            &["No de créditos", "6 ECTS"],
            &["Curso", "Segundo curso"],
            &["Semestre", "Tercer semestre"],
            &["Idioma de impartición", "Castellano"],
            &["Titulación", "61CI - Grado en Ingeniería de Computadores"],
            &["Centro responsable de la titulación", "10 - E.T.S. de Ingeniería de Sistemas Informáticos"],
        ],
    ));
    metadata.push(text(50, 290, 12, "2. Profesorado"));
    metadata.extend(grid(
        50,
        300,
        &[170, 80, 200],
        20,
        &[
            &["Nombre", "Despacho", "Correo electrónico"],
            &["Ana García", "1201", "ana.garcia@upm.es"],
            &["Luis Pérez", "1202", "luis.perez@upm.es"],
        ],
    ));

    let mut sections = grid(
        50,
        80,
        &[170, 80, 200],
        20,
        &[
            &["Eva Ruiz", "1203", "eva.ruiz@upm.es"],
            &["Pilar Gil", "1204", "pilar.gil@upm.es"],
        ],
    );
    sections.extend(lines(
        150,
        &[
            "3. Conocimientos previos recomendados",
            "3.1. Asignaturas previas que se recomienda haber cursado",
            "Fundamentos de Programación",
            "4. Competencias y resultados de aprendizaje",
            "4.1. Competencias",
            "CG01 - Capacidad de análisis y síntesis",
            "CE12 - Diseño de sistemas operativos",
            "4.2. Resultados del aprendizaje",
            "RA1 - Comprende la gestión de procesos",
        ],
    ));

    let syllabus = lines(
        90,
        &[
            "5. Descripción de la asignatura y temario",
            "5.1. Descripción de la asignatura",
            "La asignatura estudia la gestión de procesos y memoria.",
            "5.2. Temario de la asignatura",
            "1. Introducción",
            "1.1. Historia",
            "2. Procesos",
            "2.1. Planificación",
            "3. Memoria",
            "6. Cronograma",
        ],
    );

    let mut resources = vec![text(50, 90, 12, "7. Recursos didácticos")];
    resources.extend(grid(
        50,
        100,
        &[250, 100, 150],
        20,
        &[
            &["Nombre", "Tipo", "Observaciones"],
            &["Stallings. Sistemas operativos", "Bibliografía", "Novena edición"],
            &["https://moodle.upm.es", "Bibliografía", ""],
            &["Laboratorio 1201", "Equipamiento", ""],
        ],
    ));

    build_pdf(&[cover, index, metadata, sections, syllabus, resources])
}

fn lines(top: i64, texts: &[&str]) -> Vec<Item> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| text(50, top + 15 * i as i64, 9, t))
        .collect()
}
