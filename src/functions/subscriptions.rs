use super::notifications::{queue_notification, NotificationPayload};
use super::{FunctionError, Services};
use crate::fields::{lookup, str_at};
use crate::firestore::models::FieldOperator;
use crate::firestore::query::Query;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde_json::{json, Map, Value};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
const NOTICE_DAYS: i64 = 3;

/// Whole days until `expiry`, rounded up.
pub fn days_left(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (expiry - now).num_milliseconds();
    millis.div_euclid(DAY_MILLIS) + i64::from(millis.rem_euclid(DAY_MILLIS) != 0)
}

fn expiry_notice(user: &Value, now: DateTime<Utc>) -> Option<i64> {
    let expiry = str_at(user, "subscription.expiryDate")
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
        .with_timezone(&Utc);

    let days = days_left(expiry, now);
    let auto_renew_off = lookup(user, "subscription.autoRenew") == Some(&Value::Bool(false));

    (days == NOTICE_DAYS && auto_renew_off).then_some(days)
}

/// Queues a `subscription_expiring` notification for every active subscription that ends in
/// exactly three days and will not renew. Returns how many were queued.
pub async fn check_expiring_subscriptions(
    services: &Services,
    now: DateTime<Utc>,
) -> Result<usize, FunctionError> {
    let query = Query::new("users").where_filter("subscription.isActive", FieldOperator::Equal, true)?;
    let users = services.firestore.query(query).get().await?;

    let mut pending = Vec::new();
    for user in users.iter() {
        let Some(data) = user.data::<Value>()? else {
            continue;
        };
        let Some(days) = expiry_notice(&data, now) else {
            continue;
        };

        let mut extra = Map::new();
        extra.insert("daysLeft".to_string(), json!(days.to_string()));

        let payload = NotificationPayload {
            kind: "subscription_expiring".to_string(),
            title: "Subscription Expiring Soon".to_string(),
            body: format!(
                "Your premium subscription expires in {} days. Renew to keep your benefits!",
                days
            ),
            route: "/subscription".to_string(),
            data: extra,
        };
        let user_id = user.id().to_string();

        pending.push(async move { queue_notification(&services.firestore, &user_id, &payload).await });
    }

    let queued = try_join_all(pending).await?.len();
    tracing::info!(checked = users.size(), queued, "checked expiring subscriptions");
    Ok(queued)
}
