pub mod guide_pdf;
