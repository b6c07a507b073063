//! Point-of-sale settlement tests

mod common;

use common::*;
use depot_backend::error::AppError;
use depot_backend::services::sales::{CreateSaleInput, SaleItemInput};
use depot_backend::services::SalesService;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{Pagination, PaymentMethod, StockKey};

fn sale_input(warehouse_id: i64, lines: &[(i64, Decimal, Decimal)]) -> CreateSaleInput {
    CreateSaleInput {
        warehouse_id,
        customer_name: Some("Walk-in".to_string()),
        payment_method: "card".to_string(),
        discount_amount: Decimal::ZERO,
        tax_rate: Decimal::ZERO,
        items: lines
            .iter()
            .map(|&(variant_id, quantity, unit_price)| SaleItemInput {
                variant_id,
                quantity,
                unit_price,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_sale_deducts_stock_and_computes_totals() {
    let (_, store) = store();
    stock(&store, MAIN, WIDGET, dec("10")).await;
    stock(&store, MAIN, GADGET, dec("4")).await;
    let service = SalesService::new(store.clone());

    let mut input = sale_input(
        MAIN,
        &[(WIDGET, dec("3"), dec("12.00")), (GADGET, dec("2"), dec("5.50"))],
    );
    input.discount_amount = dec("7.00");
    input.tax_rate = dec("10");
    let sale = service.process_sale(USER, input).await.unwrap();

    assert_eq!(sale.subtotal, dec("47.00"));
    assert_eq!(sale.discount_amount, dec("7.00"));
    assert_eq!(sale.tax_amount, dec("4.00"));
    assert_eq!(sale.total_amount, dec("44.00"));
    assert_eq!(sale.payment_method, PaymentMethod::Card);
    assert_eq!(sale.items.len(), 2);
    assert_eq!(sale.items[0].line_total, dec("36.00"));

    assert_eq!(level(&store, MAIN, WIDGET).await, dec("7"));
    assert_eq!(level(&store, MAIN, GADGET).await, dec("2"));

    let fetched = service.get_sale(sale.id).await.unwrap();
    assert_eq!(fetched, sale);
}

#[tokio::test]
async fn test_sale_with_insufficient_stock_changes_nothing() {
    let (_, store) = store();
    stock(&store, MAIN, WIDGET, dec("5")).await;
    let service = SalesService::new(store.clone());

    let err = service
        .process_sale(USER, sale_input(MAIN, &[(WIDGET, dec("6"), dec("1.00"))]))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientStock { available, requested, .. }
            if available == dec("5") && requested == dec("6")
    ));
    assert_eq!(level(&store, MAIN, WIDGET).await, dec("5"));
    let sales = service.list_sales(&Pagination::default()).await.unwrap();
    assert!(sales.data.is_empty());
}

#[tokio::test]
async fn test_sale_is_atomic_when_last_deduction_fails() {
    let (memory, store) = store();
    stock(&store, MAIN, WIDGET, dec("10")).await;
    stock(&store, MAIN, GADGET, dec("10")).await;
    memory.inject_delta_failure(StockKey::new(MAIN, GADGET)).await;
    let service = SalesService::new(store.clone());

    let err = service
        .process_sale(
            USER,
            sale_input(
                MAIN,
                &[(WIDGET, dec("2"), dec("1.00")), (GADGET, dec("2"), dec("1.00"))],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    assert_eq!(level(&store, MAIN, WIDGET).await, dec("10"));
    assert_eq!(level(&store, MAIN, GADGET).await, dec("10"));
    let sales = service.list_sales(&Pagination::default()).await.unwrap();
    assert_eq!(sales.pagination.total_items, 0);

    // Once the store recovers the same sale goes through
    memory.clear_delta_failures().await;
    service
        .process_sale(
            USER,
            sale_input(
                MAIN,
                &[(WIDGET, dec("2"), dec("1.00")), (GADGET, dec("2"), dec("1.00"))],
            ),
        )
        .await
        .unwrap();
    assert_eq!(level(&store, MAIN, GADGET).await, dec("8"));
}

#[tokio::test]
async fn test_sale_checks_combined_demand_of_repeated_variant() {
    let (_, store) = store();
    stock(&store, MAIN, WIDGET, dec("5")).await;
    let service = SalesService::new(store.clone());

    let err = service
        .process_sale(
            USER,
            sale_input(
                MAIN,
                &[(WIDGET, dec("3"), dec("1.00")), (WIDGET, dec("3"), dec("1.00"))],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));
    assert_eq!(level(&store, MAIN, WIDGET).await, dec("5"));
}

#[tokio::test]
async fn test_sale_input_validation() {
    let (_, store) = store();
    stock(&store, MAIN, WIDGET, dec("5")).await;
    let service = SalesService::new(store);

    let mut input = sale_input(MAIN, &[(WIDGET, dec("1"), dec("1.00"))]);
    input.payment_method = "barter".to_string();
    let err = service.process_sale(USER, input).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let mut input = sale_input(MAIN, &[(WIDGET, dec("1"), dec("1.00"))]);
    input.discount_amount = dec("2.00");
    let err = service.process_sale(USER, input).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service
        .process_sale(USER, sale_input(MAIN, &[(WIDGET, Decimal::ZERO, dec("1.00"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity(_)));

    let err = service
        .process_sale(USER, sale_input(MAIN, &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = service
        .process_sale(USER, sale_input(MISSING_WAREHOUSE, &[(WIDGET, dec("1"), dec("1.00"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WarehouseNotFound(MISSING_WAREHOUSE)));

    let err = service
        .process_sale(USER, sale_input(MAIN, &[(MISSING_VARIANT, dec("1"), dec("1.00"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::VariantNotFound(MISSING_VARIANT)));
}

#[tokio::test]
async fn test_sale_with_unstorable_amounts_is_rejected() {
    let (_, store) = store();
    stock(&store, MAIN, WIDGET, dec("5")).await;
    let service = SalesService::new(store.clone());

    let err = service
        .process_sale(USER, sale_input(MAIN, &[(WIDGET, dec("2"), Decimal::MAX)]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    let err = service
        .process_sale(USER, sale_input(MAIN, &[(WIDGET, dec("0.00001"), dec("1.00"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity(_)));

    // One line just under the limit fits, two of them do not
    let sale = service
        .process_sale(USER, sale_input(MAIN, &[(WIDGET, dec("1"), dec("99999999999999"))]))
        .await
        .unwrap();
    assert_eq!(sale.total_amount, dec("99999999999999"));

    let err = service
        .process_sale(
            USER,
            sale_input(
                MAIN,
                &[(WIDGET, dec("1"), dec("99999999999999")), (WIDGET, dec("1"), dec("99999999999999"))],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(level(&store, MAIN, WIDGET).await, dec("4"));
}

#[tokio::test]
async fn test_get_missing_sale() {
    let (_, store) = store();
    let service = SalesService::new(store);

    let err = service.get_sale(31).await.unwrap_err();
    assert!(matches!(err, AppError::SaleNotFound(31)));
}

// ============================================================================
// Property-Based Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    /// A sale either deducts every line or leaves every level untouched
    #[test]
    fn prop_sale_all_or_nothing(
        widget_stock in 0i64..20,
        gadget_stock in 0i64..20,
        widget_qty in 1i64..20,
        gadget_qty in 1i64..20,
    ) {
        tokio_test::block_on(async {
            let (_, store) = store();
            if widget_stock > 0 {
                stock(&store, OUTLET, WIDGET, Decimal::from(widget_stock)).await;
            }
            if gadget_stock > 0 {
                stock(&store, OUTLET, GADGET, Decimal::from(gadget_stock)).await;
            }
            let service = SalesService::new(store.clone());

            let result = service
                .process_sale(
                    USER,
                    sale_input(
                        OUTLET,
                        &[
                            (WIDGET, Decimal::from(widget_qty), dec("1.00")),
                            (GADGET, Decimal::from(gadget_qty), dec("1.00")),
                        ],
                    ),
                )
                .await;

            let widget_after = level(&store, OUTLET, WIDGET).await;
            let gadget_after = level(&store, OUTLET, GADGET).await;
            let fits = widget_qty <= widget_stock && gadget_qty <= gadget_stock;

            if fits {
                prop_assert!(result.is_ok());
                prop_assert_eq!(widget_after, Decimal::from(widget_stock - widget_qty));
                prop_assert_eq!(gadget_after, Decimal::from(gadget_stock - gadget_qty));
            } else {
                let rejected = matches!(result, Err(AppError::InsufficientStock { .. }));
                prop_assert!(rejected);
                prop_assert_eq!(widget_after, Decimal::from(widget_stock));
                prop_assert_eq!(gadget_after, Decimal::from(gadget_stock));
            }
            Ok(())
        })?;
    }
}
