use std::sync::Arc;

use common::dlq::DlqEnvelope;
use mq::{BroccoliError, BrokerMessage, Mq};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{error, info};

use crate::dlq::DlqService;

/// Store one envelope published by a worker.
pub async fn persist_envelope(db: &DatabaseConnection, envelope: &DlqEnvelope) -> anyhow::Result<i32> {
    let txn = db.begin().await?;
    let entry = DlqService::new(&txn).send_to_dlq(envelope).await?;
    txn.commit().await?;
    Ok(entry.id)
}

/// Drain the workers' dead letter queue into `dead_letter_message`.
pub async fn consume_dead_letters(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting dead letter consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None,
            None,
            move |message: BrokerMessage<DlqEnvelope>| {
                let db = db.clone();
                async move {
                    let envelope = message.payload;

                    match persist_envelope(&db, &envelope).await {
                        Ok(id) => {
                            info!(
                                id,
                                message_id = %envelope.message_id,
                                message_type = %envelope.message_type,
                                error_code = %envelope.error_code,
                                "Persisted dead letter"
                            );
                            Ok(())
                        }
                        Err(e) => {
                            error!(
                                message_id = %envelope.message_id,
                                error = %e,
                                "Failed to persist dead letter"
                            );
                            Err(BroccoliError::Job(format!("DB persistence failed: {e}")))
                        }
                    }
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Dead letter consumer stopped unexpectedly");
    }
}
