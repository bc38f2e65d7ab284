//! Order placement, cancellation and status transitions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::order::{
    generate_order_number, Address, LineItem, Order, OrderError, OrderStatus, PaymentMethod,
    PaymentStatus,
};
use crate::domain::user::Principal;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Attempts at a fresh order number before giving up on collisions.
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "order must contain at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub shipping_address: AddressRequest,
    pub billing_address: Option<AddressRequest>,
    pub payment: PaymentSelector,
    pub note: Option<String>,
}

// `Serialize` is needed because the `length` rule embeds the field value
// in the generated error params.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "quantity must be at least 1"))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct PaymentSelector {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddressRequest {
    #[validate(length(min = 1, message = "first name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, message = "last name is required"))]
    pub last_name: String,
    #[validate(length(min = 1, message = "phone is required"))]
    pub phone: String,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "zip code is required"))]
    pub zip_code: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
}

impl AddressRequest {
    fn clone_into_address(&self) -> Address {
        Address {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            phone: self.phone.clone(),
            street: self.street.clone(),
            city: self.city.clone(),
            state: self.state.clone(),
            zip_code: self.zip_code.clone(),
            country: self.country.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    #[validate(length(max = 200, message = "note is limited to 200 characters"))]
    pub note: Option<String>,
}

fn from_order_error(err: OrderError) -> ApiError {
    match err {
        OrderError::NoItems => ApiError::Validation(err.to_string()),
        _ => ApiError::BusinessRule(err.to_string()),
    }
}

/// Validate lines against the catalog, reserve stock with compensation on
/// partial failure, and persist the order with a fresh order number.
pub async fn place_order(
    state: &AppState,
    user_id: Uuid,
    request: CreateOrderRequest,
) -> ApiResult<Order> {
    request.validate()?;
    for item in &request.items {
        item.validate()?;
    }
    request.shipping_address.validate()?;
    if let Some(billing) = &request.billing_address {
        billing.validate()?;
    }

    // Snapshot current catalog prices; client-supplied prices are ignored.
    let mut lines: Vec<LineItem> = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let product = state
            .products
            .get(item.product_id)
            .await?
            .ok_or(ApiError::NotFound("product"))?;
        if !product.is_active {
            return Err(ApiError::BusinessRule(format!(
                "product {} is no longer available",
                product.name
            )));
        }
        if product.stock < item.quantity as i32 {
            return Err(ApiError::BusinessRule(format!(
                "insufficient stock for {}",
                product.name
            )));
        }
        lines.push(LineItem {
            product_id: product.id,
            name: product.name,
            quantity: item.quantity,
            unit_price: product.price,
            total: product.price * Decimal::from(item.quantity),
        });
    }

    // Reserve stock line by line; a failed line rolls back everything
    // reserved so far, so a partially stocked order never half-applies.
    let mut reserved: Vec<(Uuid, u32)> = Vec::with_capacity(lines.len());
    for line in &lines {
        let ok = state
            .products
            .try_reserve_stock(line.product_id, line.quantity)
            .await?;
        if !ok {
            release(state, &reserved).await;
            return Err(ApiError::BusinessRule(format!(
                "insufficient stock for {}",
                line.name
            )));
        }
        reserved.push((line.product_id, line.quantity));
    }

    let order = match persist_with_fresh_number(state, user_id, lines, &request).await {
        Ok(order) => order,
        Err(err) => {
            release(state, &reserved).await;
            return Err(err);
        }
    };

    info!(order_number = %order.order_number, user_id = %user_id, total = %order.total, "order placed");
    Ok(order)
}

async fn persist_with_fresh_number(
    state: &AppState,
    user_id: Uuid,
    lines: Vec<LineItem>,
    request: &CreateOrderRequest,
) -> ApiResult<Order> {
    let mut last_err = None;
    for _ in 0..ORDER_NUMBER_ATTEMPTS {
        let order = Order::place(
            generate_order_number(),
            user_id,
            lines.clone(),
            request.payment.method,
            request.shipping_address.clone_into_address(),
            request.billing_address.as_ref().map(|b| b.clone_into_address()),
            request.note.clone(),
        )
        .map_err(from_order_error)?;
        match state.orders.insert(order).await {
            Ok(order) => return Ok(order),
            Err(ApiError::Conflict(msg)) => {
                warn!(%msg, "order number collision, regenerating");
                last_err = Some(ApiError::Conflict(msg));
            }
            Err(other) => return Err(other),
        }
    }
    Err(last_err.unwrap_or_else(|| ApiError::Internal(anyhow::anyhow!("order insert failed"))))
}

async fn release(state: &AppState, reserved: &[(Uuid, u32)]) {
    for (product_id, qty) in reserved {
        if let Err(err) = state.products.restock(*product_id, *qty).await {
            warn!(%product_id, qty, error = %err, "failed to release reserved stock");
        }
    }
}

/// Buyer-initiated cancel: permitted only while the order is pending.
/// The optimistic write settles a concurrent cancel/ship race; only the
/// winner restores stock.
pub async fn cancel_order(
    state: &AppState,
    principal: &Principal,
    order_id: Uuid,
) -> ApiResult<Order> {
    let mut order = state
        .orders
        .get(order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if !principal.may_access(order.user_id) {
        return Err(ApiError::Forbidden("not your order".into()));
    }
    if order.status != OrderStatus::Pending {
        return Err(ApiError::BusinessRule(
            "only pending orders can be cancelled".into(),
        ));
    }
    order
        .transition(
            OrderStatus::Cancelled,
            Some("cancelled by customer".into()),
            Some(principal.id()),
        )
        .map_err(from_order_error)?;
    let order = state.orders.update(&order).await?;
    restore_stock(state, &order).await;
    Ok(order)
}

/// Admin status update through the transition allow-list. Moving into
/// `cancelled` restores stock exactly once (the optimistic write guards
/// against a double restore).
pub async fn update_status(
    state: &AppState,
    admin_id: Uuid,
    order_id: Uuid,
    request: StatusUpdateRequest,
) -> ApiResult<Order> {
    request.validate()?;
    let mut order = state
        .orders
        .get(order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    // A paid order keeps its money until a refund moves it back; cancelling
    // one outright would strand the payment at the gateway.
    if request.status == OrderStatus::Cancelled && order.payment.status == PaymentStatus::Paid {
        return Err(ApiError::BusinessRule(
            "paid orders must be refunded, not cancelled".into(),
        ));
    }
    let restores_stock = request.status == OrderStatus::Cancelled;
    order
        .transition(request.status, request.note, Some(admin_id))
        .map_err(from_order_error)?;
    let order = state.orders.update(&order).await?;
    if restores_stock {
        restore_stock(state, &order).await;
    }
    Ok(order)
}

pub(crate) async fn restore_stock(state: &AppState, order: &Order) {
    for item in &order.items {
        if let Err(err) = state.products.restock(item.product_id, item.quantity).await {
            warn!(order_number = %order.order_number, product_id = %item.product_id,
                  error = %err, "failed to restore stock");
        }
    }
}

/// Admin delete, restricted to terminal orders.
pub async fn delete_order(state: &AppState, order_id: Uuid) -> ApiResult<()> {
    let order = state
        .orders
        .get(order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if !order.status.is_terminal() {
        return Err(ApiError::BusinessRule(
            "only cancelled or refunded orders can be deleted".into(),
        ));
    }
    state.orders.delete(order_id).await?;
    Ok(())
}
