/// Binary document collaborators, specified at their decode/encode
/// boundary: DOCX and PDF yield extracted plain text, XLSX yields the
/// shared tabular model and encodes back to a minimal workbook.
use std::io::{Cursor, Read, Write};

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ServiceError, ServiceResult};
use crate::formats::{Sheet, Table};

/// Extract the visible text of a DOCX package with paragraph breaks
/// preserved as blank lines.
pub fn docx_text(bytes: &[u8]) -> ServiceResult<String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::Validation(format!("invalid DOCX archive: {}", e)))?;

    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|_| ServiceError::Validation("missing word/document.xml in DOCX".into()))?;

    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|e| ServiceError::Validation(format!("unreadable DOCX XML: {}", e)))?;

    let mut reader = XmlReader::from_str(&xml);
    let mut buf = Vec::new();
    let mut output = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    if !output.is_empty() {
                        output.push_str("\n\n");
                    }
                }
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                b"w:t" => in_text_node = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    if !output.is_empty() {
                        output.push_str("\n\n");
                    }
                }
                b"w:tab" => output.push('\t'),
                b"w:br" => output.push('\n'),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value = e
                        .unescape()
                        .map_err(|e| ServiceError::Validation(format!("bad DOCX XML: {}", e)))?;
                    output.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_node = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::Validation(format!("bad DOCX XML: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(output.trim().to_string())
}

/// Extract the text layer of a PDF.
pub fn pdf_text(bytes: &[u8]) -> ServiceResult<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map(|text| text.trim().to_string())
        .map_err(|e| ServiceError::Validation(format!("PDF text extraction failed: {}", e)))
}

/// Decode an XLSX workbook into the tabular model: shared strings resolved,
/// one sheet per worksheet part, first row as headers.
pub fn xlsx_table(bytes: &[u8]) -> ServiceResult<Table> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::Validation(format!("invalid XLSX archive: {}", e)))?;

    let shared = read_shared_strings(&mut archive)?;

    let mut sheet_names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.name_for_index(i).map(|n| n.to_string()))
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .collect();
    sheet_names.sort();

    let mut sheets = Vec::new();
    for name in sheet_names {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|_| ServiceError::Validation(format!("missing worksheet part {}", name)))?
            .read_to_string(&mut xml)
            .map_err(|e| ServiceError::Validation(format!("unreadable worksheet: {}", e)))?;

        let grid = parse_sheet(&xml, &shared)?;
        let mut rows = grid;
        let headers = if rows.is_empty() { Vec::new() } else { rows.remove(0) };

        let stem = name
            .trim_start_matches("xl/worksheets/")
            .trim_end_matches(".xml");
        sheets.push(Sheet {
            name: stem.to_string(),
            headers,
            rows,
        });
    }

    Ok(Table { sheets })
}

fn read_shared_strings(archive: &mut ZipArchive<Cursor<&[u8]>>) -> ServiceResult<Vec<String>> {
    let mut xml = String::new();
    match archive.by_name("xl/sharedStrings.xml") {
        Ok(mut part) => {
            part.read_to_string(&mut xml)
                .map_err(|e| ServiceError::Validation(format!("unreadable sharedStrings: {}", e)))?;
        }
        Err(_) => return Ok(Vec::new()),
    }

    let mut reader = XmlReader::from_str(&xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_entry = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"si" => {
                    in_entry = true;
                    current.clear();
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_entry && in_text {
                    let value = e
                        .unescape()
                        .map_err(|e| ServiceError::Validation(format!("bad sharedStrings: {}", e)))?;
                    current.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"si" => {
                    in_entry = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::Validation(format!("bad sharedStrings: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

fn parse_sheet(xml: &str, shared: &[String]) -> ServiceResult<Vec<Vec<String>>> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_row = false;
    let mut column = 0usize;
    let mut cell_type = CellType::Number;
    let mut in_value = false;
    let mut in_inline_text = false;
    let mut value = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"row" => {
                    in_row = true;
                    row.clear();
                }
                b"c" if in_row => {
                    cell_type = CellType::Number;
                    column = row.len();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"r" => {
                                let cell_ref = String::from_utf8_lossy(&attr.value).to_string();
                                column = column_of(&cell_ref);
                            }
                            b"t" => {
                                cell_type = match attr.value.as_ref() {
                                    b"s" => CellType::Shared,
                                    b"inlineStr" => CellType::Inline,
                                    _ => CellType::Number,
                                };
                            }
                            _ => {}
                        }
                    }
                    value.clear();
                }
                b"v" => in_value = true,
                b"t" => in_inline_text = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_value || in_inline_text {
                    let text = e
                        .unescape()
                        .map_err(|e| ServiceError::Validation(format!("bad worksheet XML: {}", e)))?;
                    value.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"row" => {
                    in_row = false;
                    rows.push(std::mem::take(&mut row));
                }
                b"c" if in_row => {
                    let resolved = match cell_type {
                        CellType::Shared => value
                            .trim()
                            .parse::<usize>()
                            .ok()
                            .and_then(|idx| shared.get(idx).cloned())
                            .unwrap_or_default(),
                        CellType::Inline | CellType::Number => value.clone(),
                    };
                    while row.len() < column {
                        row.push(String::new());
                    }
                    row.push(resolved);
                }
                b"v" => in_value = false,
                b"t" => in_inline_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ServiceError::Validation(format!("bad worksheet XML: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

#[derive(Clone, Copy)]
enum CellType {
    Number,
    Shared,
    Inline,
}

/// Zero-based column index of an `A1`-style cell reference.
fn column_of(cell_ref: &str) -> usize {
    let mut column = 0usize;
    for c in cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()) {
        column = column * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    column.saturating_sub(1)
}

fn column_name(mut column: usize) -> String {
    let mut name = String::new();
    column += 1;
    while column > 0 {
        let rem = (column - 1) % 26;
        name.insert(0, (b'A' + rem as u8) as char);
        column = (column - 1) / 26;
    }
    name
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Encode the tabular model as a minimal single-pass workbook with inline
/// strings. Styles and other parts of the source package are not carried
/// over; the artifact holds the translated grid only.
pub fn xlsx_encode(table: &Table) -> ServiceResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |e: zip::result::ZipError| ServiceError::Validation(format!("XLSX write error: {}", e));

    let sheet_count = table.sheets.len().max(1);

    let mut content_types = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
         <Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
         <Default Extension=\"xml\" ContentType=\"application/xml\"/>\
         <Override PartName=\"/xl/workbook.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml\"/>",
    );
    for index in 0..sheet_count {
        content_types.push_str(&format!(
            "<Override PartName=\"/xl/worksheets/sheet{}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml\"/>",
            index + 1
        ));
    }
    content_types.push_str("</Types>");

    writer.start_file("[Content_Types].xml", options).map_err(zip_err)?;
    writer.write_all(content_types.as_bytes())?;

    writer.start_file("_rels/.rels", options).map_err(zip_err)?;
    writer.write_all(
        b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
          <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">\
          <Relationship Id=\"rId1\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument\" Target=\"xl/workbook.xml\"/>\
          </Relationships>",
    )?;

    let mut workbook = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <workbook xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\" \
         xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"><sheets>",
    );
    let mut workbook_rels = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <Relationships xmlns=\"http://schemas.openxmlformats.org/package/2006/relationships\">",
    );
    for index in 0..sheet_count {
        let name = table
            .sheets
            .get(index)
            .map(|s| xml_escape(&s.name))
            .unwrap_or_else(|| format!("Sheet{}", index + 1));
        workbook.push_str(&format!(
            "<sheet name=\"{}\" sheetId=\"{}\" r:id=\"rId{}\"/>",
            name,
            index + 1,
            index + 1
        ));
        workbook_rels.push_str(&format!(
            "<Relationship Id=\"rId{}\" Type=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet\" Target=\"worksheets/sheet{}.xml\"/>",
            index + 1,
            index + 1
        ));
    }
    workbook.push_str("</sheets></workbook>");
    workbook_rels.push_str("</Relationships>");

    writer.start_file("xl/workbook.xml", options).map_err(zip_err)?;
    writer.write_all(workbook.as_bytes())?;
    writer.start_file("xl/_rels/workbook.xml.rels", options).map_err(zip_err)?;
    writer.write_all(workbook_rels.as_bytes())?;

    for index in 0..sheet_count {
        let empty = Sheet {
            name: format!("Sheet{}", index + 1),
            headers: Vec::new(),
            rows: Vec::new(),
        };
        let sheet = table.sheets.get(index).unwrap_or(&empty);

        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
             <worksheet xmlns=\"http://schemas.openxmlformats.org/spreadsheetml/2006/main\"><sheetData>",
        );

        let mut all_rows: Vec<&Vec<String>> = Vec::new();
        if !sheet.headers.is_empty() {
            all_rows.push(&sheet.headers);
        }
        all_rows.extend(sheet.rows.iter());

        for (row_idx, row) in all_rows.iter().enumerate() {
            xml.push_str(&format!("<row r=\"{}\">", row_idx + 1));
            for (col_idx, cell) in row.iter().enumerate() {
                if cell.is_empty() {
                    continue;
                }
                xml.push_str(&format!(
                    "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                    column_name(col_idx),
                    row_idx + 1,
                    xml_escape(cell)
                ));
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");

        writer
            .start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)
            .map_err(zip_err)?;
        writer.write_all(xml.as_bytes())?;
    }

    let cursor = writer.finish().map_err(zip_err)?;
    Ok(cursor.into_inner())
}
