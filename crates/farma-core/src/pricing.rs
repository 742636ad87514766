//! # Price Normalizer
//!
//! Derives the real purchase price of each line item and a manufacturer label
//! for each product.
//!
//! ## Discount Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  supplier legal name contains a discount-free name? (case-insensitive) │
//! │        │                                                                │
//! │   yes  ├──► net = stated unit price, discount % = 0                     │
//! │        │                                                                │
//! │   no   └──► scan infAdProd:                                             │
//! │               1. Desc<.>NN[,NN]%     "Lista (+)Desc.77,08%" → 77.08     │
//! │               2. DESC<ws>NN[.NN]%    "DESC 47.07%"          → 47.07     │
//! │               none                                          → 0         │
//! │                                                                         │
//! │             pct > 0 → net = round(stated × (1 − pct/100), 2)            │
//! │             else    → net = stated                                      │
//! │             overflow → InvalidInvoiceStructure for the whole invoice    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Some distributors print list prices and the negotiated discount only as
//! free text; others already invoice at the final price. The discount-free
//! list is injected at construction so tests and deployments can differ.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{CoreError, CoreResult};
use crate::types::{InvoiceRecord, LineItem, NormalizedInvoice, PricedItem};
use crate::MANUFACTURER_NOT_INFORMED;

/// Discount markers, tried in order.
static DISCOUNT_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?i)desc\.?(\d+(?:[.,]\d+)?)%").unwrap(),
        Regex::new(r"(?i)desc\s+(\d+(?:[.,]\d+)?)%").unwrap(),
    ]
});

/// Decimal places of a computed net unit price.
const NET_PRICE_SCALE: u32 = 2;

// =============================================================================
// Normalizer
// =============================================================================

/// Applies the supplier-aware discount policy to extracted invoices.
///
/// Constructed once from configuration and shared by reference.
#[derive(Debug, Clone, Default)]
pub struct PriceNormalizer {
    /// Upper-cased discount-free supplier names.
    discount_free: Vec<String>,
}

impl PriceNormalizer {
    /// Creates a normalizer; blank names are ignored.
    pub fn new<I, S>(discount_free_suppliers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let discount_free = discount_free_suppliers
            .into_iter()
            .map(|name| name.as_ref().trim().to_uppercase())
            .filter(|name| !name.is_empty())
            .collect();
        Self { discount_free }
    }

    /// Returns true when the supplier already invoices at net prices.
    pub fn is_discount_free(&self, legal_name: &str) -> bool {
        let legal_name = legal_name.to_uppercase();
        self.discount_free
            .iter()
            .any(|name| legal_name.contains(name.as_str()))
    }

    /// Computes net prices and manufacturer labels for every item.
    ///
    /// ## Errors
    /// `InvalidInvoiceStructure` when an item's discount cannot be applied
    /// to its unit price without overflowing.
    pub fn normalize(&self, record: InvoiceRecord) -> CoreResult<NormalizedInvoice> {
        let discount_free = self.is_discount_free(&record.supplier.legal_name);

        let items = record
            .items
            .into_iter()
            .map(|item| price_item(item, discount_free))
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(NormalizedInvoice {
            invoice: record.invoice,
            supplier: record.supplier,
            items,
        })
    }
}

fn price_item(item: LineItem, discount_free: bool) -> CoreResult<PricedItem> {
    let discount_percentage = if discount_free {
        Decimal::ZERO
    } else {
        item.additional_info
            .as_deref()
            .map(discount_percentage)
            .unwrap_or(Decimal::ZERO)
    };

    let net_unit_price =
        net_unit_price(item.unit_price, discount_percentage).ok_or_else(|| {
            CoreError::invalid_structure(format!(
                "item {}: discount {}% overflows unit price {}",
                item.sequence, discount_percentage, item.unit_price
            ))
        })?;

    Ok(PricedItem {
        net_unit_price,
        manufacturer: manufacturer(&item.product.name),
        discount_percentage,
        item,
    })
}

// =============================================================================
// Discount
// =============================================================================

/// Finds the discount percentage in an item annotation, 0 when absent.
pub fn discount_percentage(text: &str) -> Decimal {
    DISCOUNT_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(text))
        .and_then(|captures| captures.get(1))
        .and_then(|value| Decimal::from_str(&value.as_str().replace(',', ".")).ok())
        .unwrap_or(Decimal::ZERO)
}

/// Applies a percentage discount to a unit price.
///
/// Returns `None` when the result does not fit in a `Decimal`.
pub fn net_unit_price(unit_price: Decimal, percentage: Decimal) -> Option<Decimal> {
    if percentage <= Decimal::ZERO {
        return Some(unit_price);
    }
    let factor = Decimal::ONE.checked_sub(percentage.checked_div(Decimal::ONE_HUNDRED)?)?;
    let net = unit_price.checked_mul(factor)?;
    Some(net.round_dp_with_strategy(NET_PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

// =============================================================================
// Manufacturer
// =============================================================================

/// Derives a manufacturer label from a product's descriptive name.
///
/// ## Rules (first match wins)
/// 1. `DIPIRONA 500MG (EMS)` → `EMS`
/// 2. `PARACETAMOL - CIMED` → `CIMED`
/// 3. last token wrapped in parentheses
/// 4. [`MANUFACTURER_NOT_INFORMED`]
pub fn manufacturer(name: &str) -> String {
    let name = name.trim();
    trailing_group(name)
        .or_else(|| last_hyphen_segment(name))
        .or_else(|| parenthesized_last_token(name))
        .unwrap_or_else(|| MANUFACTURER_NOT_INFORMED.to_string())
}

fn trailing_group(name: &str) -> Option<String> {
    let contents = trailing_parenthesized(name)?;
    let label = match trailing_parenthesized(contents.trim_end()) {
        Some(inner) => {
            let cut = contents.trim_end().len() - inner.len() - 2;
            &contents[..cut]
        }
        None => contents,
    };
    non_empty(label)
}

/// Contents of the balanced `(...)` group that ends `text`.
fn trailing_parenthesized(text: &str) -> Option<&str> {
    let body = text.strip_suffix(')')?;
    let mut depth = 1usize;
    for (index, ch) in body.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&body[index + 1..]);
                }
            }
            _ => {}
        }
    }
    None
}

fn last_hyphen_segment(name: &str) -> Option<String> {
    name.rsplit_once(" - ")
        .and_then(|(_, segment)| non_empty(segment))
}

fn parenthesized_last_token(name: &str) -> Option<String> {
    name.split_whitespace()
        .last()?
        .strip_prefix('(')?
        .strip_suffix(')')
        .and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvoiceHeader, ProductInfo, Supplier};
    use chrono::DateTime;

    fn dec(text: &str) -> Decimal {
        text.parse().unwrap()
    }

    fn item(sequence: u32, name: &str, unit_price: &str, info: Option<&str>) -> LineItem {
        LineItem {
            sequence,
            product: ProductInfo {
                code: format!("P{sequence}"),
                barcode: None,
                name: name.to_string(),
                ncm: None,
                unit: Some("UN".to_string()),
            },
            quantity: dec("1"),
            unit_price: dec(unit_price),
            gross_total: dec(unit_price),
            discount: Decimal::ZERO,
            additional_info: info.map(str::to_string),
        }
    }

    fn record(supplier: &str, items: Vec<LineItem>) -> InvoiceRecord {
        InvoiceRecord {
            invoice: InvoiceHeader {
                access_key: "3".repeat(44),
                number: "1".to_string(),
                series: "1".to_string(),
                issued_at: DateTime::parse_from_rfc3339("2024-01-15T10:30:00-03:00").unwrap(),
                total: dec("10.00"),
            },
            supplier: Supplier {
                cnpj: "12345678000195".to_string(),
                legal_name: supplier.to_string(),
                trade_name: supplier.to_string(),
                address: String::new(),
            },
            items,
        }
    }

    #[test]
    fn test_discount_patterns() {
        let cases = [
            ("Lista (+)Desc.77,08%", "77.08"),
            ("DESC 47.07%", "47.07"),
            ("desc.20%", "20"),
            ("Desc12,5%", "12.5"),
            ("DESC   3%", "3"),
            ("PMC 12,00 Desc.10,00% Lote X", "10.00"),
            ("sem desconto", "0"),
            ("Desc. 10%", "0"),
            ("DESC 10", "0"),
            ("", "0"),
        ];
        for (text, expected) in cases {
            assert_eq!(discount_percentage(text), dec(expected), "input {text:?}");
        }
    }

    #[test]
    fn test_first_pattern_wins() {
        assert_eq!(discount_percentage("DESC 5% Desc.7%"), dec("7"));
    }

    #[test]
    fn test_net_unit_price() {
        assert_eq!(net_unit_price(dec("10.00"), dec("20")), Some(dec("8.00")));
        assert_eq!(net_unit_price(dec("10.00"), Decimal::ZERO), Some(dec("10.00")));
        assert_eq!(net_unit_price(dec("10.5"), Decimal::ZERO), Some(dec("10.5")));
        // 12.35 × 0.2292 = 2.83062
        assert_eq!(net_unit_price(dec("12.35"), dec("77.08")), Some(dec("2.83")));
        // 0.25 × 0.5 = 0.125 rounds away from zero
        assert_eq!(net_unit_price(dec("0.25"), dec("50")), Some(dec("0.13")));
        // Over 100% is applied as written
        assert_eq!(net_unit_price(dec("10.00"), dec("150")), Some(dec("-5.00")));
    }

    #[test]
    fn test_net_unit_price_overflow() {
        let huge = discount_percentage("Desc.79228162514264337593543950%");
        assert_eq!(huge, dec("79228162514264337593543950"));
        assert_eq!(net_unit_price(dec("1000000"), huge), None);
    }

    #[test]
    fn test_overflowing_discount_rejects_invoice() {
        let normalizer = PriceNormalizer::default();
        let err = normalizer
            .normalize(record(
                "ABC",
                vec![
                    item(1, "A", "10.00", Some("Desc.10%")),
                    item(2, "B", "1000000", Some("Desc.79228162514264337593543950%")),
                ],
            ))
            .unwrap_err();

        match err {
            CoreError::InvalidInvoiceStructure { reason } => {
                assert!(reason.starts_with("item 2:"), "{reason}");
            }
            other => panic!("expected InvalidInvoiceStructure, got {other:?}"),
        }
    }

    #[test]
    fn test_manufacturer_rules() {
        let cases = [
            ("DIPIRONA 500MG (EMS)", "EMS"),
            ("PARACETAMOL - CIMED", "CIMED"),
            ("VITAMINA C", "not informed"),
            ("AMOXICILINA 500MG (EUROFARMA (REF 123))", "EUROFARMA"),
            ("  DORFLEX 10CP (SANOFI)  ", "SANOFI"),
            ("SORO - FISIOLOGICO - BAXTER", "BAXTER"),
            ("NIMESULIDA ()", "not informed"),
            ("NIMESULIDA - ", "not informed"),
            ("", "not informed"),
        ];
        for (name, expected) in cases {
            assert_eq!(manufacturer(name), expected, "name {name:?}");
        }
    }

    #[test]
    fn test_parenthesized_group_beats_hyphen() {
        assert_eq!(manufacturer("GEL - 30G (NEO QUIMICA)"), "NEO QUIMICA");
    }

    #[test]
    fn test_discount_applied_for_regular_supplier() {
        let normalizer = PriceNormalizer::new(["PROFARMA"]);
        let normalized = normalizer.normalize(record(
            "DISTRIBUIDORA ABC LTDA",
            vec![item(1, "DIPIRONA (EMS)", "10.00", Some("Desc.20%"))],
        ))
        .unwrap();
        let priced = &normalized.items[0];
        assert_eq!(priced.discount_percentage, dec("20"));
        assert_eq!(priced.net_unit_price, dec("8.00"));
        assert_eq!(priced.manufacturer, "EMS");
    }

    #[test]
    fn test_discount_free_supplier_keeps_stated_price() {
        let normalizer = PriceNormalizer::new(["profarma"]);
        let normalized = normalizer.normalize(record(
            "Profarma Distribuidora S.A.",
            vec![item(1, "DIPIRONA (EMS)", "10.00", Some("Desc.20%"))],
        ))
        .unwrap();
        let priced = &normalized.items[0];
        assert_eq!(priced.discount_percentage, Decimal::ZERO);
        assert_eq!(priced.net_unit_price, dec("10.00"));
    }

    #[test]
    fn test_blank_names_are_ignored() {
        let normalizer = PriceNormalizer::new(["", "   "]);
        assert!(!normalizer.is_discount_free("ANY SUPPLIER"));
        assert!(!PriceNormalizer::default().is_discount_free("ANY SUPPLIER"));
    }

    #[test]
    fn test_item_without_annotation() {
        let normalizer = PriceNormalizer::new(Vec::<String>::new());
        let normalized = normalizer.normalize(record(
            "ABC",
            vec![
                item(1, "A", "4.99", None),
                item(2, "B", "3.00", Some("DESC 10%")),
            ],
        ))
        .unwrap();
        assert_eq!(normalized.items[0].net_unit_price, dec("4.99"));
        assert_eq!(normalized.items[1].net_unit_price, dec("2.70"));
        assert_eq!(
            normalized.items.iter().map(|p| p.item.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }
}
