//! Aggregates module
pub mod product;
pub mod sale;
pub mod coupon;
pub mod cart;
pub mod order;
pub mod review;
pub mod address;
pub mod customer;

pub use product::{Product, ProductError, ProductVariation, VariationType};
pub use sale::{Sale, SaleIndex};
pub use coupon::{normalize_code, validate_coupon, AppliedCoupon, Coupon, CouponRejection, DiscountType};
pub use cart::{MAX_LINE_QUANTITY, Cart, CartEntry, CartError, CartLine, CartSummary, Wishlist, WishlistEntry, WishlistLine};
pub use order::{Order, OrderError, OrderItem, OrderStatus, StatusPolicy, TransitionError};
pub use review::{average_rating, review_eligibility, Review, ReviewBlock};
pub use address::{AddressSnapshot, ShippingAddress};
pub use customer::Customer;
