//! The `produce` command: load the schema, build samples, publish them.

use crate::config::{ProduceArgs, SchemaArgs};
use anyhow::Context;
use fixture_kafka_producer::{
    Connector, KafkaConnector, LoopSummary, MemoryBroker, PublishLoop, SampleBuilder,
};
use proto_schema::{MessageFactory, SchemaGraph};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Load and resolve the descriptor set.
///
/// Unresolved files are logged by the resolver and skipped, unless
/// `--strict` turns them into an error.
pub fn load_graph(args: &SchemaArgs) -> anyhow::Result<SchemaGraph> {
    let path = &args.descriptor_file;
    let records = proto_schema::load_file(path)
        .with_context(|| format!("Failed to load descriptor set from {}", path.display()))?;
    info!("Loaded {} file descriptors", records.len());

    let graph = SchemaGraph::resolve(records);
    info!(
        "Resolved {} files in {} passes",
        graph.files().len(),
        graph.passes()
    );
    if args.strict {
        graph
            .ensure_complete()
            .context("Descriptor set has unresolved files")?;
    }
    Ok(graph)
}

pub fn load_factory(args: &SchemaArgs) -> anyhow::Result<MessageFactory> {
    Ok(MessageFactory::new(Arc::new(load_graph(args)?)))
}

/// Run `produce` against Kafka, or the in-memory broker with `--dry-run`.
pub async fn run_produce(
    args: &ProduceArgs,
    token: CancellationToken,
) -> anyhow::Result<LoopSummary> {
    info!("Kafka brokers: {}", args.brokers);
    info!("Descriptor file: {}", args.schema.descriptor_file.display());

    let connector: Arc<dyn Connector> = if args.dry_run {
        info!("Dry run: publishing to an in-memory broker");
        Arc::new(MemoryBroker::new(args.partitions))
    } else {
        Arc::new(KafkaConnector::new(&args.brokers, args.publish_timeout))
    };
    run_produce_with(args, connector, token).await
}

/// Run `produce` with an explicit connector.
pub async fn run_produce_with(
    args: &ProduceArgs,
    connector: Arc<dyn Connector>,
    token: CancellationToken,
) -> anyhow::Result<LoopSummary> {
    if !args.startup_delay.is_zero() {
        info!("Waiting {:?} for Kafka to be ready", args.startup_delay);
        tokio::select! {
            _ = tokio::time::sleep(args.startup_delay) => {}
            _ = token.cancelled() => return Ok(LoopSummary::default()),
        }
    }

    let factory = load_factory(&args.schema)?;
    let builder = SampleBuilder::new(factory).context("Failed to find sample message types")?;
    let samples = builder
        .corpus(args.user_count, args.order_count, &args.topics())
        .context("Failed to build sample messages")?;
    info!("Created {} sample messages", samples.len());

    if args.create_topics && !args.dry_run {
        let kafka = KafkaConnector::new(&args.brokers, args.publish_timeout);
        for topic in [&args.user_topic, &args.order_topic] {
            kafka
                .create_topic_if_not_exists(topic, args.partitions)
                .await
                .with_context(|| format!("Failed to create topic {topic}"))?;
        }
    }

    PublishLoop::new(connector, samples, args.cadence())
        .run(token)
        .await
        .context("Failed to publish sample messages")
}
