//! Deterministic linking of analyzer output to existing orders.

use std::sync::Arc;

use async_trait::async_trait;
use parcelwatch_model::{EmailAnalysis, Order, UserId};

use crate::database::ports::orders::OrderStore;
use crate::error::Result;

/// How many recent same-vendor orders the fuzzy rule considers.
const VENDOR_CANDIDATE_LIMIT: i64 = 5;

/// Resolves an analysis against the user's existing orders. Reads only.
#[async_trait]
pub trait OrderMatcher: Send + Sync {
    async fn find_match(&self, analysis: &EmailAnalysis, user_id: UserId)
    -> Result<Option<Order>>;
}

/// Priority rules, first match wins:
/// 1. exact order number, 2. exact tracking number, 3. same vendor domain
/// with a case-insensitive item-name overlap among the 5 most recent.
pub struct DefaultOrderMatcher {
    orders: Arc<dyn OrderStore>,
}

impl std::fmt::Debug for DefaultOrderMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultOrderMatcher").finish_non_exhaustive()
    }
}

impl DefaultOrderMatcher {
    pub fn new(orders: Arc<dyn OrderStore>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl OrderMatcher for DefaultOrderMatcher {
    async fn find_match(
        &self,
        analysis: &EmailAnalysis,
        user_id: UserId,
    ) -> Result<Option<Order>> {
        if let Some(order_number) = &analysis.order_number {
            if let Some(order) = self
                .orders
                .find_by_order_number(user_id, order_number)
                .await?
            {
                return Ok(Some(order));
            }
        }

        if let Some(tracking_number) = &analysis.tracking_number {
            if let Some(order) = self
                .orders
                .find_by_tracking_number(user_id, tracking_number)
                .await?
            {
                return Ok(Some(order));
            }
        }

        if let Some(vendor_domain) = &analysis.vendor_domain {
            let Some(items) = &analysis.items else {
                return Ok(None);
            };
            let email_item_names: Vec<String> = items
                .iter()
                .filter(|item| !item.name.is_empty())
                .map(|item| item.name.to_lowercase())
                .collect();
            if email_item_names.is_empty() {
                return Ok(None);
            }

            let candidates = self
                .orders
                .recent_by_vendor_domain(user_id, vendor_domain, VENDOR_CANDIDATE_LIMIT)
                .await?;

            for candidate in candidates {
                let Some(candidate_items) = &candidate.items else {
                    continue;
                };
                let overlap = candidate_items.iter().any(|item| {
                    email_item_names
                        .iter()
                        .any(|name| name.eq_ignore_ascii_case(&item.name))
                });
                if overlap {
                    return Ok(Some(candidate));
                }
            }
        }

        Ok(None)
    }
}
