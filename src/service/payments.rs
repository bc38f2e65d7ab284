//! Payment bridge flows: checkout URL creation, webhook reconciliation,
//! return-path verification, status query and refunds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::domain::order::{Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::domain::user::Principal;
use crate::error::{ApiError, ApiResult};
use crate::gateway::{PagePayRequest, RefundRequest, TRADE_CLOSED, TRADE_FINISHED, TRADE_SUCCESS};
use crate::service::orders::restore_stock;
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    #[validate(length(min = 1, message = "subject is required"))]
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_url: String,
    pub order_number: String,
    pub amount: Decimal,
    pub subject: String,
}

/// Build the hosted-checkout redirect for an order. The charged amount is
/// the order total on record; the client cannot influence it.
pub async fn create_payment(
    state: &AppState,
    user_id: Uuid,
    request: CreatePaymentRequest,
) -> ApiResult<CreatePaymentResponse> {
    request.validate()?;
    let mut order = state
        .orders
        .get(request.order_id)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if order.user_id != user_id {
        return Err(ApiError::Forbidden("not your order".into()));
    }
    if order.payment.status == PaymentStatus::Paid {
        return Err(ApiError::BusinessRule("order is already paid".into()));
    }

    let payment_url = state.gateway.page_pay_url(&PagePayRequest {
        out_trade_no: order.order_number.clone(),
        total_amount: order.total,
        subject: request.subject.clone(),
    })?;

    order.payment.method = PaymentMethod::Alipay;
    order.payment.transaction_id = Some(order.order_number.clone());
    let order = state.orders.update(&order).await?;

    Ok(CreatePaymentResponse {
        payment_url,
        order_number: order.order_number,
        amount: order.total,
        subject: request.subject,
    })
}

/// Outcome of a gateway notification, rendered as the literal body the
/// gateway expects.
#[derive(Debug, PartialEq, Eq)]
pub enum NotifyOutcome {
    Success,
    Fail,
}

impl NotifyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyOutcome::Success => "success",
            NotifyOutcome::Fail => "fail",
        }
    }
}

/// Reconcile an asynchronous server-to-server notification.
///
/// Signature first, no exceptions; then a check-then-set guard on the
/// payment status in *every* trade-status branch so that at-least-once
/// delivery never double-applies.
pub async fn handle_notification(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> NotifyOutcome {
    if !state.gateway.verify_notification(&params) {
        warn!("payment notification with invalid signature rejected");
        return NotifyOutcome::Fail;
    }
    let Some(out_trade_no) = params.get("out_trade_no") else {
        warn!("payment notification without out_trade_no");
        return NotifyOutcome::Fail;
    };
    let order = match state.orders.get_by_number(out_trade_no).await {
        Ok(Some(order)) => order,
        Ok(None) => {
            warn!(%out_trade_no, "notification for unknown order");
            return NotifyOutcome::Fail;
        }
        Err(err) => {
            error!(%out_trade_no, error = %err, "order lookup failed");
            return NotifyOutcome::Fail;
        }
    };

    let trade_status = params.get("trade_status").map(String::as_str);
    match trade_status {
        Some(TRADE_SUCCESS) | Some(TRADE_FINISHED) => {
            let trade_no = params.get("trade_no").cloned().unwrap_or_default();
            apply_success(state, order, trade_no).await
        }
        Some(TRADE_CLOSED) => apply_closed(state, order).await,
        other => {
            // Unknown settlement states are acknowledged and ignored so
            // the gateway stops retrying.
            info!(%out_trade_no, ?other, "ignoring notification with unhandled trade status");
            NotifyOutcome::Success
        }
    }
}

async fn apply_success(state: &AppState, mut order: Order, trade_no: String) -> NotifyOutcome {
    match order.mark_paid(trade_no) {
        Ok(true) => match state.orders.update(&order).await {
            Ok(_) => {
                info!(order_number = %order.order_number, "order settled as paid");
                NotifyOutcome::Success
            }
            Err(ApiError::Conflict(_)) => {
                // Lost a race with another delivery or an admin action;
                // ask the gateway to retry against the fresh state.
                NotifyOutcome::Fail
            }
            Err(err) => {
                error!(order_number = %order.order_number, error = %err, "failed to persist settlement");
                NotifyOutcome::Fail
            }
        },
        // Already paid: re-delivery is acknowledged without mutation.
        Ok(false) => NotifyOutcome::Success,
        Err(err) => {
            // e.g. success notification for an order cancelled meanwhile;
            // acknowledged so the gateway stops retrying, left for manual
            // reconciliation.
            warn!(order_number = %order.order_number, error = %err, "unapplicable success notification");
            NotifyOutcome::Success
        }
    }
}

async fn apply_closed(state: &AppState, mut order: Order) -> NotifyOutcome {
    match order.mark_payment_failed() {
        Ok(true) => match state.orders.update(&order).await {
            Ok(updated) => {
                restore_stock(state, &updated).await;
                info!(order_number = %order.order_number, "order cancelled after closed trade");
                NotifyOutcome::Success
            }
            Err(ApiError::Conflict(_)) => NotifyOutcome::Fail,
            Err(err) => {
                error!(order_number = %order.order_number, error = %err, "failed to persist closed trade");
                NotifyOutcome::Fail
            }
        },
        Ok(false) => NotifyOutcome::Success,
        Err(err) => {
            warn!(order_number = %order.order_number, error = %err, "unapplicable closed notification");
            NotifyOutcome::Success
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReturnReport {
    pub order_number: String,
    pub trade_no: Option<String>,
    pub trade_status: Option<String>,
    pub amount: Option<Decimal>,
}

/// Synchronous browser return: re-verify the signature, then ask the
/// gateway for the live settlement state instead of trusting redirect
/// parameters.
pub async fn handle_return(
    state: &AppState,
    params: BTreeMap<String, String>,
) -> ApiResult<ReturnReport> {
    if !state.gateway.verify_notification(&params) {
        return Err(ApiError::Validation("signature verification failed".into()));
    }
    let out_trade_no = params
        .get("out_trade_no")
        .ok_or_else(|| ApiError::Validation("missing out_trade_no".into()))?;
    let result = state.gateway.query_trade(out_trade_no).await?;
    Ok(ReturnReport {
        order_number: result.out_trade_no,
        trade_no: result.trade_no,
        trade_status: result.trade_status,
        amount: result.total_amount,
    })
}

/// Local payment state plus a best-effort live gateway query.
pub async fn query_status(
    state: &AppState,
    principal: &Principal,
    order_number: &str,
) -> ApiResult<serde_json::Value> {
    let order = state
        .orders
        .get_by_number(order_number)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if !principal.may_access(order.user_id) {
        return Err(ApiError::Forbidden("not your order".into()));
    }
    let gateway_result = match state.gateway.query_trade(order_number).await {
        Ok(result) => Some(result),
        Err(err) => {
            warn!(%order_number, error = %err, "live gateway query failed");
            None
        }
    };
    Ok(json!({
        "order": {
            "orderNumber": order.order_number,
            "status": order.status,
            "payment": order.payment,
            "total": order.total,
            "createdAt": order.created_at,
        },
        "gateway": gateway_result,
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefundApiRequest {
    #[validate(length(min = 1, message = "order number is required"))]
    pub order_number: String,
    pub refund_amount: Decimal,
    #[validate(length(max = 200, message = "refund reason is limited to 200 characters"))]
    pub refund_reason: Option<String>,
}

/// Admin-only refund through the gateway. The order mutates only after
/// the gateway confirms money moved.
pub async fn refund(
    state: &AppState,
    admin_id: Uuid,
    request: RefundApiRequest,
) -> ApiResult<Order> {
    request.validate()?;
    if request.refund_amount <= Decimal::ZERO {
        return Err(ApiError::Validation("refund amount must be positive".into()));
    }
    let mut order = state
        .orders
        .get_by_number(&request.order_number)
        .await?
        .ok_or(ApiError::NotFound("order"))?;
    if order.payment.status != PaymentStatus::Paid {
        return Err(ApiError::BusinessRule(
            "only paid orders can be refunded".into(),
        ));
    }
    if request.refund_amount > order.total {
        return Err(ApiError::BusinessRule(
            "refund amount exceeds order total".into(),
        ));
    }
    // Every local precondition is checked before the gateway call; once the
    // gateway reports a fund change, nothing below may refuse to record it.
    if !order.status.can_transition_to(OrderStatus::Refunded) {
        return Err(ApiError::BusinessRule(format!(
            "order in status {} cannot be refunded",
            order.status.as_str()
        )));
    }

    let outcome = state
        .gateway
        .refund(&RefundRequest {
            out_trade_no: order.order_number.clone(),
            refund_amount: request.refund_amount,
            refund_reason: request
                .refund_reason
                .unwrap_or_else(|| "order refund".into()),
        })
        .await?;
    if !outcome.fund_change {
        return Err(ApiError::BusinessRule(format!(
            "gateway declined the refund: {}",
            outcome.detail
        )));
    }

    order
        .mark_refunded(request.refund_amount, admin_id)
        .map_err(|e| ApiError::BusinessRule(e.to_string()))?;
    let order = state.orders.update(&order).await?;
    info!(order_number = %order.order_number, amount = %request.refund_amount, "refund applied");
    Ok(order)
}
