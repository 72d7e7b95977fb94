//! End-to-end flow: proforma text in, approved purchase order out, receipt
//! validated against it.

use procure_engine::{
    discrepancy, ApprovalStore, DiscrepancyReason, DocumentKind, ExtractionMethod, RequestState,
    StructuredExtractor,
};
use rust_decimal::Decimal;

const PROFORMA_TEXT: &str = "PROFORMA INVOICE\n\
    Vendor: Kigali Office Supplies Ltd\n\
    Terms: Net 30\n\
    \n\
    1 Office Chair 2 75,000 150,000\n\
    2 Desk Lamp 5 15,000 75,000\n\
    \n\
    Subtotal: RWF 225000\n\
    Total: RWF 407100\n";

const RECEIPT_TEXT: &str = "RECEIPT\n\
    Seller: Kigali Office Supplies Ltd\n\
    \n\
    Office Chair 2 75,000\n\
    Desk Lamp 5 15,000\n";

const SHORT_RECEIPT_TEXT: &str = "RECEIPT\n\
    Seller: Kigali Office Supplies Ltd\n\
    \n\
    Office Chair 3 80,000\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init();
}

fn required_roles() -> Vec<String> {
    vec![
        "approver_level_1".to_string(),
        "approver_level_2".to_string(),
    ]
}

#[tokio::test]
async fn proforma_to_validated_receipt() {
    init_tracing();
    let extractor = StructuredExtractor::new(None);

    let proforma = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;
    assert_eq!(proforma.method, ExtractionMethod::Basic);
    assert_eq!(proforma.total_amount, "407100");
    assert_eq!(proforma.items.len(), 2);

    let mut store = ApprovalStore::new(":memory:", required_roles()).unwrap();
    let uid = store.create_request("Office furniture", "alice").unwrap();
    store.attach_proforma(&uid, &proforma).unwrap();

    assert_eq!(
        store
            .record_decision(&uid, "bob", "approver_level_1", true, "looks good")
            .unwrap(),
        RequestState::Pending
    );
    assert_eq!(
        store
            .record_decision(&uid, "carol", "approver_level_2", true, "approved")
            .unwrap(),
        RequestState::Approved
    );

    // The PO total is the item sum, not the document total (which carries
    // tax the line items do not).
    let po = store.purchase_order(&uid).unwrap().unwrap();
    assert_eq!(po.total, Decimal::from(225_000));

    let receipt = extractor.extract(RECEIPT_TEXT, DocumentKind::Receipt).await;
    assert_eq!(receipt.items.len(), 2);
    let report = discrepancy::validate(&receipt, &po);
    assert!(discrepancy::is_valid(&report));
}

#[tokio::test]
async fn discrepant_receipt_is_reported() {
    init_tracing();
    let extractor = StructuredExtractor::new(None);
    let proforma = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;

    let mut store = ApprovalStore::new(":memory:", required_roles()).unwrap();
    let uid = store.create_request("Office furniture", "alice").unwrap();
    store.attach_proforma(&uid, &proforma).unwrap();
    store
        .record_decision(&uid, "bob", "approver_level_1", true, "")
        .unwrap();
    store
        .record_decision(&uid, "carol", "approver_level_2", true, "")
        .unwrap();
    let po = store.purchase_order(&uid).unwrap().unwrap();

    let receipt = extractor
        .extract(SHORT_RECEIPT_TEXT, DocumentKind::Receipt)
        .await;
    assert_eq!(receipt.items.len(), 1);

    let report = discrepancy::validate(&receipt, &po);
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].reason, DiscrepancyReason::QuantityMismatch);
    assert_eq!(report[1].reason, DiscrepancyReason::PriceMismatch);
}
