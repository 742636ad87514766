//! # Invoice Extractor
//!
//! Walks the generic XML tree and builds an [`InvoiceRecord`].
//!
//! ## Envelope Location
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Candidate 1: nfeProc / NFe / infNFe   (authorized, with protocol)     │
//! │  Candidate 2: NFe / infNFe             (bare signed invoice)           │
//! │                                                                         │
//! │  First candidate that resolves to a node wins.                         │
//! │  None resolves → InvalidInvoiceStructure                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Access Key Sources (tried in order)
//! 1. `Id` attribute on `infNFe` (`NFe3524...`)
//! 2. `chNFe` inside the authorization protocol (`protNFe/infProt`)
//!
//! The 3-character `NFe` prefix is stripped and the result must be exactly
//! 44 digits.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::{CoreError, CoreResult};
use crate::types::{InvoiceHeader, InvoiceRecord, LineItem, ProductInfo, Supplier};
use crate::xml::XmlNode;
use crate::{ACCESS_KEY_LEN, ACCESS_KEY_PREFIX};

/// Envelope paths, most specific first.
const ENVELOPE_PATHS: &[&[&str]] = &[&["nfeProc", "NFe", "infNFe"], &["NFe", "infNFe"]];

/// Address fields of `enderEmit`, in composition order.
const ADDRESS_FIELDS: &[&str] = &["xLgr", "nro", "xBairro", "xMun", "UF", "CEP"];

/// Literal NFe uses for products without a barcode.
const NO_BARCODE: &str = "SEM GTIN";

/// A strategy receives the document root and the located envelope.
type AccessKeyStrategy = fn(&XmlNode, &XmlNode) -> Option<String>;

const ACCESS_KEY_STRATEGIES: &[(&str, AccessKeyStrategy)] = &[
    ("infNFe/@Id", access_key_from_envelope_id),
    ("protNFe/infProt/chNFe", access_key_from_protocol),
];

// =============================================================================
// Entry Point
// =============================================================================

/// Extracts the canonical invoice record from a parsed document.
///
/// Pure: the same tree always produces the same record.
///
/// ## Errors
/// `InvalidInvoiceStructure` when the envelope, a required field, or every
/// `det` item is missing, or a numeric field is not a number.
pub fn extract_invoice(document: &XmlNode) -> CoreResult<InvoiceRecord> {
    let envelope = locate_envelope(document)?;

    let supplier = extract_supplier(envelope)?;
    let invoice = extract_header(document, envelope)?;
    let items = extract_items(envelope)?;

    Ok(InvoiceRecord {
        invoice,
        supplier,
        items,
    })
}

/// Finds `infNFe` at the first matching envelope path.
pub fn locate_envelope(document: &XmlNode) -> CoreResult<&XmlNode> {
    ENVELOPE_PATHS
        .iter()
        .find_map(|path| document.node_at(path))
        .ok_or_else(|| {
            CoreError::invalid_structure("no NFe envelope at nfeProc/NFe/infNFe or NFe/infNFe")
        })
}

// =============================================================================
// Supplier
// =============================================================================

fn extract_supplier(envelope: &XmlNode) -> CoreResult<Supplier> {
    let emit = envelope
        .node_at(&["emit"])
        .ok_or_else(|| CoreError::missing_field("emit"))?;

    let cnpj = emit
        .text_at(&["CNPJ"])
        .or_else(|| emit.text_at(&["CPF"]))
        .map(digits_only)
        .filter(|digits| !digits.is_empty())
        .ok_or_else(|| CoreError::missing_field("emit/CNPJ"))?;

    let legal_name = required_text(emit, &["xNome"], "emit/xNome")?;
    let trade_name = emit
        .text_at(&["xFant"])
        .map(str::to_string)
        .unwrap_or_else(|| legal_name.clone());

    let address = emit
        .node_at(&["enderEmit"])
        .map(compose_address)
        .unwrap_or_default();

    Ok(Supplier {
        cnpj,
        legal_name,
        trade_name,
        address,
    })
}

/// Joins the address fields with ", ", skipping empty ones.
pub fn compose_address(address: &XmlNode) -> String {
    ADDRESS_FIELDS
        .iter()
        .filter_map(|field| address.text_at(&[*field]))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Invoice Header
// =============================================================================

fn extract_header(document: &XmlNode, envelope: &XmlNode) -> CoreResult<InvoiceHeader> {
    let ide = envelope
        .node_at(&["ide"])
        .ok_or_else(|| CoreError::missing_field("ide"))?;

    let number = required_text(ide, &["nNF"], "ide/nNF")?;
    let series = ide.text_at(&["serie"]).unwrap_or_default().to_string();
    let issued_at = emission_timestamp(ide)?;
    let access_key = extract_access_key(document, envelope)?;
    let total = decimal_at(envelope, &["total", "ICMSTot", "vNF"], "total/ICMSTot/vNF")?
        .unwrap_or(Decimal::ZERO);

    Ok(InvoiceHeader {
        access_key,
        number,
        series,
        issued_at,
        total,
    })
}

fn extract_access_key(document: &XmlNode, envelope: &XmlNode) -> CoreResult<String> {
    let (source, raw) = ACCESS_KEY_STRATEGIES
        .iter()
        .find_map(|(source, strategy)| strategy(document, envelope).map(|raw| (*source, raw)))
        .ok_or_else(|| CoreError::missing_field("infNFe/@Id"))?;

    let key = normalize_access_key(&raw);
    if key.len() != ACCESS_KEY_LEN || !key.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::invalid_structure(format!(
            "access key from {source} must have {ACCESS_KEY_LEN} digits, got '{key}'"
        )));
    }
    Ok(key)
}

fn access_key_from_envelope_id(_document: &XmlNode, envelope: &XmlNode) -> Option<String> {
    envelope.text_at(&["Id"]).map(str::to_string)
}

fn access_key_from_protocol(document: &XmlNode, _envelope: &XmlNode) -> Option<String> {
    document
        .text_at(&["nfeProc", "protNFe", "infProt", "chNFe"])
        .map(str::to_string)
}

/// Strips the `NFe` document-type prefix, if present.
pub fn normalize_access_key(raw: &str) -> String {
    let raw = raw.trim();
    match raw.get(..ACCESS_KEY_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(ACCESS_KEY_PREFIX) => {
            raw[ACCESS_KEY_PREFIX.len()..].to_string()
        }
        _ => raw.to_string(),
    }
}

/// `dhEmi` (full timestamp) preferred, `dEmi` (date only, NFe 2.0) as fallback.
fn emission_timestamp(ide: &XmlNode) -> CoreResult<DateTime<FixedOffset>> {
    if let Some(text) = ide.text_at(&["dhEmi"]) {
        return parse_timestamp(text).ok_or_else(|| {
            CoreError::invalid_structure(format!("ide/dhEmi is not a timestamp: '{text}'"))
        });
    }

    let text = ide
        .text_at(&["dEmi"])
        .ok_or_else(|| CoreError::missing_field("ide/dhEmi"))?;
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| CoreError::invalid_structure(format!("ide/dEmi is not a date: '{text}'")))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().fixed_offset())
}

fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok().or_else(|| {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

// =============================================================================
// Line Items
// =============================================================================

fn extract_items(envelope: &XmlNode) -> CoreResult<Vec<LineItem>> {
    let det = envelope
        .get("det")
        .ok_or_else(|| CoreError::invalid_structure("invoice has no det items"))?;

    det.as_list()
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let sequence = index as u32 + 1;
            let node = value.as_node().ok_or_else(|| {
                CoreError::invalid_structure(format!("det[{sequence}] is not an element"))
            })?;
            extract_item(node, sequence)
        })
        .collect()
}

fn extract_item(det: &XmlNode, sequence: u32) -> CoreResult<LineItem> {
    let field = |name: &str| format!("det[{sequence}]/prod/{name}");

    let prod = det
        .node_at(&["prod"])
        .ok_or_else(|| CoreError::missing_field(&format!("det[{sequence}]/prod")))?;

    let product = ProductInfo {
        code: required_text(prod, &["cProd"], &field("cProd"))?,
        barcode: barcode(prod),
        name: required_text(prod, &["xProd"], &field("xProd"))?,
        ncm: prod.text_at(&["NCM"]).map(str::to_string),
        unit: prod.text_at(&["uCom"]).map(str::to_string),
    };

    let quantity = required_decimal(prod, "qCom", &field("qCom"))?;
    if quantity <= Decimal::ZERO {
        return Err(CoreError::invalid_structure(format!(
            "{} must be positive, got {quantity}",
            field("qCom")
        )));
    }

    Ok(LineItem {
        sequence,
        product,
        quantity,
        unit_price: required_decimal(prod, "vUnCom", &field("vUnCom"))?,
        gross_total: required_decimal(prod, "vProd", &field("vProd"))?,
        discount: decimal_at(prod, &["vDesc"], &field("vDesc"))?.unwrap_or(Decimal::ZERO),
        additional_info: det.text_at(&["infAdProd"]).map(str::to_string),
    })
}

fn barcode(prod: &XmlNode) -> Option<String> {
    ["cEAN", "cEANTrib"]
        .iter()
        .filter_map(|field| prod.text_at(&[*field]))
        .find(|code| !code.eq_ignore_ascii_case(NO_BARCODE))
        .map(str::to_string)
}

// =============================================================================
// Field Helpers
// =============================================================================

fn required_text(node: &XmlNode, path: &[&str], field: &str) -> CoreResult<String> {
    node.text_at(path)
        .map(str::to_string)
        .ok_or_else(|| CoreError::missing_field(field))
}

fn decimal_at(node: &XmlNode, path: &[&str], field: &str) -> CoreResult<Option<Decimal>> {
    node.text_at(path)
        .map(|text| {
            Decimal::from_str(text).map_err(|_| {
                CoreError::invalid_structure(format!("{field} is not a number: '{text}'"))
            })
        })
        .transpose()
}

fn required_decimal(prod: &XmlNode, name: &str, field: &str) -> CoreResult<Decimal> {
    decimal_at(prod, &[name], field)?.ok_or_else(|| CoreError::missing_field(field))
}

fn digits_only(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_document;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    const KEY: &str = "35240112345678000195550010000001231000001230";

    fn det(n: u32, code: &str, name: &str, extra: &str) -> String {
        format!(
            r#"<det nItem="{n}"><prod><cProd>{code}</cProd><cEAN>7891234567890</cEAN><xProd>{name}</xProd><NCM>30049099</NCM><uCom>CX</uCom><qCom>2.0000</qCom><vUnCom>10.0000000000</vUnCom><vProd>20.00</vProd>{extra}</prod><infAdProd>Lista (+)Desc.10,00%</infAdProd></det>"#
        )
    }

    fn inf_nfe(id_attr: &str, dets: &str) -> String {
        format!(
            r#"<infNFe {id_attr} versao="4.00">
                <ide><cUF>35</cUF><nNF>123</nNF><serie>1</serie><dhEmi>2024-01-15T10:30:00-03:00</dhEmi></ide>
                <emit>
                    <CNPJ>12345678000195</CNPJ>
                    <xNome>DISTRIBUIDORA DE MEDICAMENTOS ABC LTDA</xNome>
                    <xFant>ABC FARMA</xFant>
                    <enderEmit><xLgr>RUA DAS FLORES</xLgr><nro>100</nro><xBairro>CENTRO</xBairro><xMun>SAO PAULO</xMun><UF>SP</UF><CEP>01001000</CEP></enderEmit>
                </emit>
                {dets}
                <total><ICMSTot><vNF>60.00</vNF></ICMSTot></total>
            </infNFe>"#
        )
    }

    fn processed(dets: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <nfeProc xmlns="http://www.portalfiscal.inf.br/nfe" versao="4.00">
                <NFe>{}</NFe>
                <protNFe><infProt><chNFe>{KEY}</chNFe></infProt></protNFe>
            </nfeProc>"#,
            inf_nfe(&format!(r#"Id="NFe{KEY}""#), dets)
        )
    }

    fn extract(xml: &str) -> CoreResult<InvoiceRecord> {
        extract_invoice(&parse_document(xml).unwrap())
    }

    #[test]
    fn test_processed_invoice() {
        let dets = [
            det(1, "A1", "DIPIRONA 500MG (EMS)", ""),
            det(2, "B2", "PARACETAMOL - CIMED", "<vDesc>1.50</vDesc>"),
        ]
        .concat();
        let record = extract(&processed(&dets)).unwrap();

        assert_eq!(record.invoice.access_key, KEY);
        assert_eq!(record.invoice.number, "123");
        assert_eq!(record.invoice.series, "1");
        assert_eq!(record.invoice.total, dec("60.00"));
        assert_eq!(
            record.invoice.issued_at.to_rfc3339(),
            "2024-01-15T10:30:00-03:00"
        );

        assert_eq!(record.supplier.cnpj, "12345678000195");
        assert_eq!(
            record.supplier.legal_name,
            "DISTRIBUIDORA DE MEDICAMENTOS ABC LTDA"
        );
        assert_eq!(record.supplier.trade_name, "ABC FARMA");
        assert_eq!(
            record.supplier.address,
            "RUA DAS FLORES, 100, CENTRO, SAO PAULO, SP, 01001000"
        );

        assert_eq!(record.items.len(), 2);
        let first = &record.items[0];
        assert_eq!(first.sequence, 1);
        assert_eq!(first.product.code, "A1");
        assert_eq!(first.product.barcode.as_deref(), Some("7891234567890"));
        assert_eq!(first.product.ncm.as_deref(), Some("30049099"));
        assert_eq!(first.product.unit.as_deref(), Some("CX"));
        assert_eq!(first.quantity, dec("2"));
        assert_eq!(first.unit_price, dec("10"));
        assert_eq!(first.gross_total, dec("20.00"));
        assert_eq!(first.discount, Decimal::ZERO);
        assert_eq!(first.additional_info.as_deref(), Some("Lista (+)Desc.10,00%"));

        assert_eq!(record.items[1].sequence, 2);
        assert_eq!(record.items[1].discount, dec("1.50"));
    }

    #[test]
    fn test_bare_invoice_falls_back_to_second_envelope_path() {
        let xml = format!(
            "<NFe>{}</NFe>",
            inf_nfe(&format!(r#"Id="NFe{KEY}""#), &det(1, "A1", "X", ""))
        );
        let record = extract(&xml).unwrap();
        assert_eq!(record.invoice.access_key, KEY);
        assert_eq!(record.items.len(), 1);
    }

    #[test]
    fn test_access_key_falls_back_to_protocol() {
        let xml = format!(
            "<nfeProc><NFe>{}</NFe><protNFe><infProt><chNFe>{KEY}</chNFe></infProt></protNFe></nfeProc>",
            inf_nfe("", &det(1, "A1", "X", ""))
        );
        assert_eq!(extract(&xml).unwrap().invoice.access_key, KEY);
    }

    #[test]
    fn test_missing_access_key() {
        let xml = format!("<NFe>{}</NFe>", inf_nfe("", &det(1, "A1", "X", "")));
        assert!(matches!(
            extract(&xml),
            Err(CoreError::InvalidInvoiceStructure { .. })
        ));
    }

    #[test]
    fn test_access_key_must_have_44_digits() {
        let xml = format!(
            "<NFe>{}</NFe>",
            inf_nfe(r#"Id="NFe1234""#, &det(1, "A1", "X", ""))
        );
        let err = extract(&xml).unwrap_err();
        assert!(err.to_string().contains("44 digits"));
    }

    #[test]
    fn test_item_order_follows_document() {
        let dets = [
            det(1, "A", "PRODUTO A", ""),
            det(2, "B", "PRODUTO B", ""),
            det(3, "C", "PRODUTO C", ""),
        ]
        .concat();
        let record = extract(&processed(&dets)).unwrap();
        let seq: Vec<(u32, &str)> = record
            .items
            .iter()
            .map(|i| (i.sequence, i.product.code.as_str()))
            .collect();
        assert_eq!(seq, vec![(1, "A"), (2, "B"), (3, "C")]);
    }

    #[test]
    fn test_no_envelope() {
        let err = extract("<root><something/></root>").unwrap_err();
        assert!(matches!(err, CoreError::InvalidInvoiceStructure { .. }));
    }

    #[test]
    fn test_no_items() {
        let err = extract(&processed("")).unwrap_err();
        assert_eq!(
            err,
            CoreError::invalid_structure("invoice has no det items")
        );
    }

    #[test]
    fn test_trade_name_falls_back_to_legal_name() {
        let xml = processed(&det(1, "A1", "X", "")).replace("<xFant>ABC FARMA</xFant>", "");
        let record = extract(&xml).unwrap();
        assert_eq!(record.supplier.trade_name, record.supplier.legal_name);
    }

    #[test]
    fn test_address_skips_empty_fields() {
        let xml = processed(&det(1, "A1", "X", ""))
            .replace("<nro>100</nro>", "<nro></nro>")
            .replace("<xBairro>CENTRO</xBairro>", "");
        let record = extract(&xml).unwrap();
        assert_eq!(
            record.supplier.address,
            "RUA DAS FLORES, SAO PAULO, SP, 01001000"
        );
    }

    #[test]
    fn test_date_only_emission() {
        let xml = processed(&det(1, "A1", "X", "")).replace(
            "<dhEmi>2024-01-15T10:30:00-03:00</dhEmi>",
            "<dEmi>2011-03-02</dEmi>",
        );
        let record = extract(&xml).unwrap();
        assert_eq!(
            record.invoice.issued_at.to_rfc3339(),
            "2011-03-02T00:00:00+00:00"
        );
    }

    #[test]
    fn test_missing_total_defaults_to_zero() {
        let xml = processed(&det(1, "A1", "X", "")).replace("<vNF>60.00</vNF>", "");
        assert_eq!(extract(&xml).unwrap().invoice.total, Decimal::ZERO);
    }

    #[test]
    fn test_barcode_fallback() {
        let xml = processed(&det(
            1,
            "A1",
            "X",
            "<cEANTrib>7890000000001</cEANTrib>",
        ))
        .replace("<cEAN>7891234567890</cEAN>", "<cEAN>SEM GTIN</cEAN>");
        let record = extract(&xml).unwrap();
        assert_eq!(
            record.items[0].product.barcode.as_deref(),
            Some("7890000000001")
        );
    }

    #[test]
    fn test_invalid_quantity() {
        let xml = processed(&det(1, "A1", "X", "")).replace("<qCom>2.0000</qCom>", "<qCom>abc</qCom>");
        let err = extract(&xml).unwrap_err();
        assert!(err.to_string().contains("det[1]/prod/qCom is not a number"));

        let xml = processed(&det(1, "A1", "X", "")).replace("<qCom>2.0000</qCom>", "<qCom>0</qCom>");
        let err = extract(&xml).unwrap_err();
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_normalize_access_key() {
        assert_eq!(normalize_access_key("NFe123"), "123");
        assert_eq!(normalize_access_key(" nfe123 "), "123");
        assert_eq!(normalize_access_key("123"), "123");
        assert_eq!(normalize_access_key(""), "");
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let xml = processed(&[det(1, "A", "A", ""), det(2, "B", "B", "")].concat());
        let tree = parse_document(&xml).unwrap();
        assert_eq!(extract_invoice(&tree), extract_invoice(&tree));
    }
}
