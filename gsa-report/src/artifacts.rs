//  ARTIFACTS.rs
//
//  Description:
//!   Builds the three artifact kinds a report job may request: a
//!   spreadsheet via `rust_xlsxwriter`, a PDF via `printpdf`,
//!   and an e-mail notification via `lettre`'s async SMTP transport.
//!   Each builder is independent and fallible on its own, so one kind
//!   failing never blocks the others (the partial-success policy lives
//!   in `generator.rs`).

use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use printpdf::{Mm, PdfDocument};
use rust_xlsxwriter::Workbook;

use specifications::analysis::AnalysisResult;

use crate::errors::ArtifactError;


/***** LIBRARY *****/
/// Renders one worksheet per dataset, each holding its pathway table.
pub fn build_spreadsheet(result: &AnalysisResult) -> Result<Vec<u8>, ArtifactError> {
    let mut workbook = Workbook::new();

    for dataset in &result.results {
        let sheet_name = sanitize_sheet_name(&dataset.dataset_name);
        let worksheet = workbook.add_worksheet().set_name(&sheet_name).map_err(|err| ArtifactError::Xlsx { err: err.to_string() })?;

        let mut row = 0u32;
        for line in dataset.results.lines() {
            for (col, field) in line.split('\t').enumerate() {
                worksheet.write(row, col as u16, field).map_err(|err| ArtifactError::Xlsx { err: err.to_string() })?;
            }
            row += 1;
        }
    }

    workbook.save_to_buffer().map_err(|err| ArtifactError::Xlsx { err: err.to_string() })
}

/// Removes characters `rust_xlsxwriter` rejects in a sheet name and caps
/// its length to the format's 31-character limit.
fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\')).collect();
    cleaned.chars().take(31).collect()
}

/// Renders a single-page summary: the pathway-database release and, per
/// dataset, its top pathway rows.
pub fn build_pdf(result: &AnalysisResult) -> Result<Vec<u8>, ArtifactError> {
    let (doc, page, layer) = PdfDocument::new("Gene-set analysis report", Mm(210.0), Mm(297.0), "Layer 1");
    let font = doc.add_builtin_font(printpdf::BuiltinFont::Helvetica).map_err(|err| ArtifactError::Pdf { err: err.to_string() })?;
    let current_layer = doc.get_page(page).get_layer(layer);

    let mut y = 280.0;
    current_layer.use_text(format!("Gene-set analysis report (release {})", result.release), 14.0, Mm(10.0), Mm(y), &font);
    y -= 10.0;

    for dataset in &result.results {
        current_layer.use_text(format!("Dataset: {}", dataset.dataset_name), 12.0, Mm(10.0), Mm(y), &font);
        y -= 8.0;
        for line in dataset.results.lines().take(20) {
            if y < 10.0 {
                break;
            }
            current_layer.use_text(line, 9.0, Mm(12.0), Mm(y), &font);
            y -= 5.0;
        }
        y -= 5.0;
    }

    let mut buffer: Vec<u8> = Vec::new();
    doc.save(&mut std::io::Cursor::new(&mut buffer)).map_err(|err| ArtifactError::Pdf { err: err.to_string() })?;
    Ok(buffer)
}

/// Sends a completion notification to `address` over the configured SMTP
/// relay, and returns the message body as the artifact blob recorded
/// under `report:{job_id}:EMAIL`.
pub async fn send_email(smtp_server: &str, address: &str, analysis_job_id: &str) -> Result<Vec<u8>, ArtifactError> {
    let body = format!("Your gene-set analysis '{analysis_job_id}' is complete. Retrieve its results via the API.");

    let message = Message::builder()
        .from("gsa-report@localhost".parse().map_err(|err: lettre::address::AddressError| ArtifactError::Smtp { err: err.to_string() })?)
        .to(address.parse().map_err(|err: lettre::address::AddressError| ArtifactError::Smtp { err: err.to_string() })?)
        .subject(format!("Analysis '{analysis_job_id}' complete"))
        .body(body.clone())
        .map_err(|err| ArtifactError::Smtp { err: err.to_string() })?;

    let (host, port) = split_host_port(smtp_server);
    let transport: AsyncSmtpTransport<Tokio1Executor> = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host).port(port).build();

    transport.send(message).await.map_err(|err| ArtifactError::Smtp { err: err.to_string() })?;
    Ok(body.into_bytes())
}

fn split_host_port(smtp_server: &str) -> (&str, u16) {
    match smtp_server.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().unwrap_or(25)),
        None => (smtp_server, 25),
    }
}
