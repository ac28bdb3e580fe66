use std::sync::Arc;

use chrono::Utc;
use indexmap::indexmap;

use tribunal::data::Data;
use tribunal::ops;
use tribunal::platform::AuditEvent;
use tribunal::punishments::PunishmentRecord;

const MAX_CONCURRENT: usize = 7;

/// Cap on each external revoke so one wedged platform call cannot stall
/// the whole sweep.
const ACTION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// One sweep: pull every lapsed record out of the ledger in a single
/// batched write, then lift the backing entitlements outside the store
/// lock.
pub async fn temporary_punishment_task(data: &Data) -> Result<(), tribunal::Error> {
    let expired = data.punishments.take_expired(Utc::now()).await?;

    if expired.is_empty() {
        return Ok(());
    }

    log::info!("Handling {} expired punishment(s)", expired.len());

    let data = Arc::new(data.clone());
    let mut set = tokio::task::JoinSet::new();

    for record in expired {
        // If over MAX_CONCURRENT tasks ongoing, wait for one to finish
        if set.len() >= MAX_CONCURRENT {
            if let Some(res) = set.join_next().await {
                if let Err(e) = res {
                    log::error!("Error while handling expiry [join]: {}", e);
                }
            }
        }

        let data = data.clone();
        set.spawn(async move { lift_expired(&data, record).await });
    }

    // Wait for all tasks to finish
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            log::error!("Error while handling expiry [join]: {}", e);
        }
    }

    Ok(())
}

/// Revoke, notify and audit one expired record. The ledger entry is
/// already deleted, so nothing here may resurrect it; a failed revoke
/// leaves the role for staff to repair and is only logged.
async fn lift_expired(data: &Data, record: PunishmentRecord) {
    let revoked = tokio::time::timeout(
        ACTION_TIMEOUT,
        data.platform.revoke_role(
            record.subject,
            record.entitlement,
            &format!("Expired: {}", record.to_log_format()),
        ),
    )
    .await;

    match revoked {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::error!(
            "Failed to revoke expired '{}' on {}: {}",
            record.category,
            record.subject,
            e
        ),
        Err(_) => log::error!(
            "Timed out revoking expired '{}' on {}",
            record.category,
            record.subject
        ),
    }

    ops::notify_subject(
        data,
        record.subject,
        &format!("Your {} has expired.", record.category.describe()),
    )
    .await;

    ops::dispatch_audit(
        data,
        AuditEvent {
            kind: "expiry",
            actor: None,
            subject: record.subject,
            reason: record.reason.clone(),
            expires_at: record.expires_at,
            fields: indexmap! {
                "record".to_string() => record.to_log_format(),
            },
        },
    )
    .await;
}
