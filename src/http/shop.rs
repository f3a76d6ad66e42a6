//! Storefront routes: catalog, cart, wishlist, checkout and account.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{ApiResult, AppState, Shopper};
use crate::domain::aggregates::{CartLine, CartSummary, Order, Review, ShippingAddress, WishlistLine};
use crate::services::addresses::AddressInput;
use crate::services::catalog::{ProductDetail, ProductPage};
use crate::services::orders::Checkout;
use crate::services::reviews::NewReview;
use crate::session::Identity;
use crate::store::ProductQuery;
use crate::StorefrontError;

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/products/:id/reviews", get(list_reviews).post(submit_review))
        .route("/cart", get(get_cart).delete(clear_cart))
        .route("/cart/items", post(add_to_cart))
        .route("/cart/items/:id", put(update_cart_item).delete(remove_cart_item))
        .route("/wishlist", get(get_wishlist).delete(clear_wishlist))
        .route("/wishlist/items", post(add_to_wishlist))
        .route("/wishlist/items/:id", delete(remove_from_wishlist))
        .route("/wishlist/items/:id/move-to-cart", post(move_to_cart))
        .route("/checkout/preview", post(preview_checkout))
        .route("/checkout", post(checkout))
        .route("/coupons/validate", post(validate_coupon))
        .route("/orders", get(my_orders))
        .route("/orders/:id", get(my_order))
        .route("/addresses", get(list_addresses).post(create_address))
        .route("/addresses/:id", put(update_address).delete(delete_address))
        .route("/addresses/:id/default", post(set_default_address))
        .route("/session/close", post(close_session))
}

fn signed_in(identity: &Identity) -> ApiResult<Uuid> {
    Ok(identity.user_id().ok_or(StorefrontError::AuthenticationRequired)?)
}

// Catalog

async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> ApiResult<Json<ProductPage>> {
    Ok(Json(s.registry.storefront().catalog().list(&q).await?))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ProductDetail>> {
    Ok(Json(s.registry.storefront().catalog().product(id).await?))
}

async fn list_reviews(State(s): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<Review>>> {
    Ok(Json(s.registry.storefront().catalog().reviews(id).await?))
}

async fn submit_review(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Path(id): Path<Uuid>,
    Json(input): Json<NewReview>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let user_id = signed_in(&identity)?;
    let review = s.registry.storefront().reviews().submit(user_id, id, input).await?;
    Ok((StatusCode::CREATED, Json(review)))
}

// Cart

#[derive(Serialize)]
struct CartView {
    lines: Vec<CartLine>,
    summary: CartSummary,
}

#[derive(Deserialize, Validate)]
struct AddToCart {
    product_id: Uuid,
    #[serde(default = "one")]
    #[validate(range(min = 1, max = 9999))]
    quantity: u32,
    variation_id: Option<Uuid>,
}

fn one() -> u32 { 1 }

#[derive(Deserialize, Validate)]
struct SetQuantity {
    #[validate(range(max = 9999))]
    quantity: u32,
}

async fn get_cart(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<Json<CartView>> {
    let session = s.registry.session(identity).await?;
    let cart = session.cart().snapshot().await;
    Ok(Json(CartView { summary: cart.summary(), lines: cart.lines().to_vec() }))
}

async fn add_to_cart(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(body): Json<AddToCart>,
) -> ApiResult<(StatusCode, Json<CartLine>)> {
    body.validate().map_err(StorefrontError::from)?;
    let session = s.registry.session(identity).await?;
    let line = session.cart().add_item(body.product_id, body.quantity, body.variation_id).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

async fn update_cart_item(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Path(id): Path<Uuid>,
    Json(body): Json<SetQuantity>,
) -> ApiResult<Json<CartSummary>> {
    body.validate().map_err(StorefrontError::from)?;
    let session = s.registry.session(identity).await?;
    session.cart().update_quantity(id, body.quantity).await?;
    Ok(Json(session.cart().summary()))
}

async fn remove_cart_item(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.registry.session(identity).await?.cart().remove_item(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_cart(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<StatusCode> {
    s.registry.session(identity).await?.cart().clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

// Wishlist

#[derive(Deserialize)]
struct AddToWishlist {
    product_id: Uuid,
}

async fn get_wishlist(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<Json<Vec<WishlistLine>>> {
    let session = s.registry.session(identity).await?;
    Ok(Json(session.wishlist().snapshot().await.lines().to_vec()))
}

async fn add_to_wishlist(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(body): Json<AddToWishlist>,
) -> ApiResult<(StatusCode, Json<WishlistLine>)> {
    let session = s.registry.session(identity).await?;
    Ok((StatusCode::CREATED, Json(session.wishlist().add(body.product_id).await?)))
}

async fn remove_from_wishlist(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    s.registry.session(identity).await?.wishlist().remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_wishlist(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<StatusCode> {
    s.registry.session(identity).await?.wishlist().clear().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_to_cart(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<Json<CartLine>> {
    let session = s.registry.session(identity).await?;
    Ok(Json(session.wishlist().move_to_cart(id, session.cart()).await?))
}

// Checkout

#[derive(Deserialize, Default)]
struct PreviewRequest {
    coupon_code: Option<String>,
}

#[derive(Deserialize)]
struct CheckoutRequest {
    address_id: Uuid,
    coupon_code: Option<String>,
}

#[derive(Deserialize)]
struct CouponCheck {
    code: String,
}

async fn preview_checkout(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(body): Json<PreviewRequest>,
) -> ApiResult<Json<Checkout>> {
    let session = s.registry.session(identity).await?;
    Ok(Json(session.preview_checkout(body.coupon_code.as_deref()).await?))
}

/// Totals for the current cart with `code` applied; rejections come back as 400.
async fn validate_coupon(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(body): Json<CouponCheck>,
) -> ApiResult<Json<Checkout>> {
    let session = s.registry.session(identity).await?;
    Ok(Json(session.preview_checkout(Some(&body.code)).await?))
}

async fn checkout(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    signed_in(&identity)?;
    let session = s.registry.session(identity).await?;
    let order = session.place_order(body.address_id, body.coupon_code.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

// Account

async fn my_orders(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<Json<Vec<Order>>> {
    let user_id = signed_in(&identity)?;
    Ok(Json(s.registry.storefront().orders().my_orders(user_id).await?))
}

async fn my_order(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<Json<Order>> {
    let user_id = signed_in(&identity)?;
    Ok(Json(s.registry.storefront().orders().order(user_id, id).await?))
}

async fn list_addresses(State(s): State<AppState>, Shopper(identity): Shopper) -> ApiResult<Json<Vec<ShippingAddress>>> {
    let user_id = signed_in(&identity)?;
    Ok(Json(s.registry.storefront().addresses().list(user_id).await?))
}

async fn create_address(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Json(input): Json<AddressInput>,
) -> ApiResult<(StatusCode, Json<ShippingAddress>)> {
    let user_id = signed_in(&identity)?;
    let address = s.registry.storefront().addresses().create(user_id, input).await?;
    Ok((StatusCode::CREATED, Json(address)))
}

async fn update_address(
    State(s): State<AppState>,
    Shopper(identity): Shopper,
    Path(id): Path<Uuid>,
    Json(input): Json<AddressInput>,
) -> ApiResult<Json<ShippingAddress>> {
    let user_id = signed_in(&identity)?;
    Ok(Json(s.registry.storefront().addresses().update(user_id, id, input).await?))
}

async fn delete_address(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let user_id = signed_in(&identity)?;
    s.registry.storefront().addresses().delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_default_address(State(s): State<AppState>, Shopper(identity): Shopper, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let user_id = signed_in(&identity)?;
    s.registry.storefront().addresses().set_default(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn close_session(State(s): State<AppState>, Shopper(identity): Shopper) -> StatusCode {
    if s.registry.close(&identity).await { StatusCode::NO_CONTENT } else { StatusCode::NOT_FOUND }
}
