//! Admin console routes. Every handler takes [`Admin`], so a missing role is a 403.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::{Admin, ApiResult, AppState};
use crate::domain::aggregates::{Coupon, Customer, Order, OrderStatus, Product, ProductVariation, Sale};
use crate::services::admin::{CouponInput, CustomerDetail, ProductInput, SaleInput, VariationInput};
use crate::services::catalog::ProductPage;
use crate::services::AdminService;
use crate::store::ProductQuery;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/products/:id/variations", get(list_variations).post(create_variation))
        .route("/variations/:id", put(update_variation).delete(delete_variation))
        .route("/sales", get(list_sales).post(create_sale))
        .route("/sales/:id", delete(delete_sale))
        .route("/sales/:id/deactivate", post(deactivate_sale))
        .route("/coupons", get(list_coupons).post(create_coupon))
        .route("/coupons/:id", put(update_coupon).delete(delete_coupon))
        .route("/coupons/:id/toggle", post(toggle_coupon))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/status", put(set_order_status))
        .route("/customers", get(list_customers))
        .route("/customers/:id", get(get_customer))
}

fn admin(s: &AppState) -> AdminService { s.registry.storefront().admin() }

// Products

async fn list_products(State(s): State<AppState>, _: Admin, Query(q): Query<ProductQuery>) -> ApiResult<Json<ProductPage>> {
    Ok(Json(admin(&s).list_products(&q).await?))
}

async fn create_product(State(s): State<AppState>, Admin(by): Admin, Json(input): Json<ProductInput>) -> ApiResult<(StatusCode, Json<Product>)> {
    let product = admin(&s).create_product(input).await?;
    info!(%by, product_id = %product.id, "product created");
    Ok((StatusCode::CREATED, Json(product)))
}

async fn update_product(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>, Json(input): Json<ProductInput>) -> ApiResult<Json<Product>> {
    Ok(Json(admin(&s).update_product(id, input).await?))
}

async fn delete_product(State(s): State<AppState>, Admin(by): Admin, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    admin(&s).delete_product(id).await?;
    info!(%by, product_id = %id, "product deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_variations(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<ProductVariation>>> {
    Ok(Json(admin(&s).variations(id).await?))
}

async fn create_variation(
    State(s): State<AppState>,
    _: Admin,
    Path(id): Path<Uuid>,
    Json(input): Json<VariationInput>,
) -> ApiResult<(StatusCode, Json<ProductVariation>)> {
    Ok((StatusCode::CREATED, Json(admin(&s).create_variation(id, input).await?)))
}

async fn update_variation(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>, Json(input): Json<VariationInput>) -> ApiResult<Json<ProductVariation>> {
    Ok(Json(admin(&s).update_variation(id, input).await?))
}

async fn delete_variation(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    admin(&s).delete_variation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Sales

async fn list_sales(State(s): State<AppState>, _: Admin) -> ApiResult<Json<Vec<Sale>>> {
    Ok(Json(admin(&s).sales().await?))
}

async fn create_sale(State(s): State<AppState>, Admin(by): Admin, Json(input): Json<SaleInput>) -> ApiResult<(StatusCode, Json<Sale>)> {
    let sale = admin(&s).create_sale(input).await?;
    info!(%by, sale_id = %sale.id, "sale created");
    Ok((StatusCode::CREATED, Json(sale)))
}

async fn deactivate_sale(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    admin(&s).deactivate_sale(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_sale(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    admin(&s).delete_sale(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Coupons

async fn list_coupons(State(s): State<AppState>, _: Admin) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(admin(&s).coupons().await?))
}

async fn create_coupon(State(s): State<AppState>, Admin(by): Admin, Json(input): Json<CouponInput>) -> ApiResult<(StatusCode, Json<Coupon>)> {
    let coupon = admin(&s).create_coupon(input).await?;
    info!(%by, code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

async fn update_coupon(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>, Json(input): Json<CouponInput>) -> ApiResult<Json<Coupon>> {
    Ok(Json(admin(&s).update_coupon(id, input).await?))
}

async fn toggle_coupon(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<Json<Coupon>> {
    Ok(Json(admin(&s).toggle_coupon(id).await?))
}

async fn delete_coupon(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    admin(&s).delete_coupon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Orders

#[derive(Deserialize)]
struct OrderFilter {
    status: Option<OrderStatus>,
}

#[derive(Deserialize)]
struct StatusChange {
    status: OrderStatus,
}

async fn list_orders(State(s): State<AppState>, _: Admin, Query(f): Query<OrderFilter>) -> ApiResult<Json<Vec<Order>>> {
    Ok(Json(admin(&s).orders(f.status).await?))
}

async fn get_order(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    Ok(Json(admin(&s).order(id).await?))
}

async fn set_order_status(
    State(s): State<AppState>,
    Admin(by): Admin,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusChange>,
) -> ApiResult<Json<Order>> {
    let order = admin(&s).set_order_status(id, body.status).await?;
    info!(%by, order_id = %id, status = ?order.status, "order status set");
    Ok(Json(order))
}

// Customers

async fn list_customers(State(s): State<AppState>, _: Admin) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(admin(&s).customers().await?))
}

async fn get_customer(State(s): State<AppState>, _: Admin, Path(id): Path<Uuid>) -> ApiResult<Json<CustomerDetail>> {
    Ok(Json(admin(&s).customer(id).await?))
}
