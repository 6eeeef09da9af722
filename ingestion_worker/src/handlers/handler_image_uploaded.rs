use std::{sync::Arc, time::Duration};

use common::{dtos::image_uploaded::ImageUploadedDto, helper::error_chain_fmt};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    Connection as RabbitMQConnection, ExchangeKind,
};
use tracing::{error, info, info_span, Instrument};

use crate::{
    configuration::IngestionSettings,
    domain::services::ingestion_pipeline::{IngestionOutcome, IngestionPipeline},
};

pub const ROUTING_KEY: &str = "object_finalized.v1";

#[derive(thiserror::Error)]
pub enum RegisterHandlerImageUploadedError {
    #[error(transparent)]
    RabbitMQError(#[from] lapin::Error),
}

impl std::fmt::Debug for RegisterHandlerImageUploadedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// Registers the message handler to the upload exchange with the `object_finalized.v1` binding key
///
/// It declares a durable queue shared by every replica of the worker using the same queue prefix,
/// and binds it to the given exchange.
/// Up to `max_concurrent_ingestions` messages are handled in parallel.
///
/// Every well-formed message is acknowledged, whatever the outcome of its ingestion:
/// a failed ingestion is logged and not retried. Malformed messages are rejected without requeue.
#[tracing::instrument(
    name = "Register message handler",
    skip(rabbitmq_consuming_connection, ingestion_pipeline)
)]
pub async fn register_handler(
    rabbitmq_consuming_connection: RabbitMQConnection,
    exchange_name: String,
    queue_name_prefix: String,
    ingestion_pipeline: Arc<IngestionPipeline>,
    ingestion_settings: IngestionSettings,
) -> Result<(), RegisterHandlerImageUploadedError> {
    let channel = rabbitmq_consuming_connection.create_channel().await?;
    let max_concurrent_ingestions = ingestion_settings.max_concurrent_ingestions.max(1);

    channel
        .basic_qos(
            u16::try_from(max_concurrent_ingestions).unwrap_or(u16::MAX),
            BasicQosOptions::default(),
        )
        .await?;

    channel
        .exchange_declare(
            &exchange_name,
            ExchangeKind::Topic,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    let queue_name = format!("{}_{}", queue_name_prefix, ROUTING_KEY);
    let queue = channel
        .queue_declare(
            &queue_name,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;

    channel
        .queue_bind(
            queue.name().as_str(),
            &exchange_name,
            ROUTING_KEY,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let consumer_options = BasicConsumeOptions {
        no_ack: false,
        ..BasicConsumeOptions::default()
    };

    let consumer = channel
        .basic_consume(
            queue.name().as_str(),
            "",
            consumer_options,
            FieldTable::default(),
        )
        .await?;

    info!(
        "📡 Handler consuming from queue {}, bound to {} with {}, waiting for messages ...",
        queue.name(),
        exchange_name,
        ROUTING_KEY,
    );

    let ingestion_pipeline = ingestion_pipeline.as_ref();
    let ingestion_timeout = ingestion_settings.timeout();
    let exchange_name = exchange_name.as_str();
    let queue_name = queue_name.as_str();

    consumer
        .for_each_concurrent(max_concurrent_ingestions, |delivery| {
            let span = info_span!(
                "Handling consumed message",
                routing_key = ROUTING_KEY,
                exchange = exchange_name,
                queue = queue_name,
                message_id = %uuid::Uuid::new_v4(),
            );

            async move {
                let delivery = match delivery {
                    // Carries the delivery alongside its channel
                    Ok(delivery) => delivery,
                    // Carries the error and is always followed by Ok(None)
                    Err(error) => {
                        error!(?error, "Failed to consume queue message on queue {}", queue_name);
                        return;
                    }
                };

                handle_delivery(ingestion_pipeline, ingestion_timeout, delivery).await;
            }
            .instrument(span)
        })
        .await;

    Ok(())
}

async fn handle_delivery(
    ingestion_pipeline: &IngestionPipeline,
    ingestion_timeout: Duration,
    delivery: Delivery,
) {
    let upload = match ImageUploadedDto::try_parsing(&delivery.data) {
        Ok(upload) => upload,
        Err(error) => {
            error!(?error, "Failed to parse upload notification, rejecting it");
            if let Err(error) = delivery
                .reject(BasicRejectOptions { requeue: false })
                .await
            {
                error!(?error, "Failed to reject upload notification");
            }
            return;
        }
    };

    info!(?upload, "Received upload notification");

    let outcome = execute_handler(ingestion_pipeline, ingestion_timeout, &upload).await;

    info!(
        ?outcome,
        "Acknowledging message with delivery tag {}", delivery.delivery_tag
    );
    if let Err(error) = delivery.ack(BasicAckOptions::default()).await {
        error!(?error, ?upload, "Failed to ack upload notification");
    }
}

/// Runs the ingestion of one upload within its wall-clock budget
///
/// An ingestion exceeding `ingestion_timeout` is dropped where it stands and reported as failed.
#[tracing::instrument(
    name = "Executing handler on uploaded image",
    skip(ingestion_pipeline)
)]
pub async fn execute_handler(
    ingestion_pipeline: &IngestionPipeline,
    ingestion_timeout: Duration,
    upload: &ImageUploadedDto,
) -> IngestionOutcome {
    match tokio::time::timeout(ingestion_timeout, ingestion_pipeline.ingest(upload)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            error!(
                timeout_secs = ingestion_timeout.as_secs(),
                "Ingestion exceeded its time budget"
            );
            IngestionOutcome::Failed
        }
    }
}
