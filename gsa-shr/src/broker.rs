//  BROKER.rs
//
//  Description:
//!   Implements the Broker client abstraction: a narrow capability over
//!   a work queue with per-queue bounded length, per-message
//!   delivery-count limit, and acknowledged delivery. Three logical
//!   queues exist: `analysis`, `report`, `dataset`.
//!
//!   `KafkaBroker` is the production implementation, grounded on the
//!   topic-administration and offset-restoration helpers this project
//!   has always used for its Kafka consumers.

use std::fmt::{Display, Formatter, Result as FResult};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication, TopicResult};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::stream_consumer::StreamConsumer;
use rdkafka::consumer::{Consumer, DefaultConsumerContext};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{Message, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use crate::blackboard::Blackboard;


/***** ERRORS *****/
/// Errors that relate to the Broker client abstraction.
#[derive(Debug)]
pub enum Error {
    /// Failed to create a new admin client to the given brokers.
    AdminClientError { brokers: String, err: rdkafka::error::KafkaError },
    /// Failed to send the command to create new queues (Kafka topics).
    TopicsCreateError { brokers: String, err: rdkafka::error::KafkaError },
    /// Failed to create a single queue.
    TopicCreateError { brokers: String, topic: String, err: RDKafkaErrorCode },

    /// Failed to retrieve the committed offsets for a queue.
    OffsetsRetrieveError { topic: String, err: rdkafka::error::KafkaError },
    /// Failed to assign the committed offsets for a queue to the topic partition list.
    OffsetsAssignError { topic: String, err: rdkafka::error::KafkaError },
    /// Failed to restore the committed offsets for a queue.
    OffsetsRestoreError { topic: String, err: rdkafka::error::KafkaError },

    /// Failed to construct a consumer for a queue.
    ConsumerCreateError { brokers: String, err: rdkafka::error::KafkaError },
    /// Failed to construct a producer.
    ProducerCreateError { brokers: String, err: rdkafka::error::KafkaError },
    /// Publishing a message to a queue failed after exhausting retries.
    PublishError { queue: String, attempts: usize, err: String },
    /// Pulling the next message off a queue failed.
    ConsumeError { queue: String, err: rdkafka::error::KafkaError },
    /// Acknowledging (committing) a message failed.
    AckError { queue: String, err: rdkafka::error::KafkaError },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use Error::*;
        match self {
            AdminClientError { brokers, err } => write!(f, "Failed to create admin client to Broker '{brokers}': {err}"),
            TopicsCreateError { brokers, err } => write!(f, "Failed to create queues on Broker '{brokers}': {err}"),
            TopicCreateError { brokers, topic, err } => write!(f, "Failed to create queue '{topic}' on Broker '{brokers}': {err}"),
            OffsetsRetrieveError { topic, err } => write!(f, "Failed to retrieve committed offsets for queue '{topic}': {err}"),
            OffsetsAssignError { topic, err } => write!(f, "Failed to assign committed offsets for queue '{topic}': {err}"),
            OffsetsRestoreError { topic, err } => write!(f, "Failed to restore committed offsets for queue '{topic}': {err}"),
            ConsumerCreateError { brokers, err } => write!(f, "Failed to create consumer for Broker '{brokers}': {err}"),
            ProducerCreateError { brokers, err } => write!(f, "Failed to create producer for Broker '{brokers}': {err}"),
            PublishError { queue, attempts, err } => write!(f, "Failed to publish message to queue '{queue}' after {attempts} attempt(s): {err}"),
            ConsumeError { queue, err } => write!(f, "Failed to consume message from queue '{queue}': {err}"),
            AckError { queue, err } => write!(f, "Failed to acknowledge message on queue '{queue}': {err}"),
        }
    }
}

impl std::error::Error for Error {}



/***** LIBRARY *****/
/// Ensures that the given queues are registered with the underlying Broker.
///
/// # Errors
/// Fails if the brokers are unreachable, or if queue creation fails for any
/// reason other than the queue already existing.
pub async fn ensure_topics(topics: &[&str], brokers: &str) -> Result<(), Error> {
    let admin_client: AdminClient<DefaultClientContext> =
        ClientConfig::new().set("bootstrap.servers", brokers).create().map_err(|err| Error::AdminClientError { brokers: brokers.into(), err })?;

    let new_topics: Vec<NewTopic> = topics.iter().map(|t| NewTopic::new(t, 1, TopicReplication::Fixed(1))).collect();

    let results: Vec<TopicResult> =
        admin_client.create_topics(new_topics.iter(), &AdminOptions::new()).await.map_err(|err| Error::TopicsCreateError { brokers: brokers.into(), err })?;

    for result in results {
        match result {
            Ok(topic) => info!("Broker queue '{topic}' created."),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => info!("Broker queue '{topic}' already exists."),
            Err((topic, err)) => return Err(Error::TopicCreateError { brokers: brokers.into(), topic, err }),
        }
    }
    Ok(())
}

/// Restores the committed offsets for `topic` onto `consumer`, so that a
/// restarted worker resumes exactly where it left off rather than replaying
/// the entire queue or skipping unacknowledged messages.
pub fn restore_committed_offsets(consumer: &StreamConsumer<DefaultConsumerContext>, topic: impl AsRef<str>) -> Result<(), Error> {
    let topic: &str = topic.as_ref();

    let mut tpl = TopicPartitionList::new();
    tpl.add_partition(topic, 0);

    let committed_offsets =
        consumer.committed_offsets(tpl.clone(), Timeout::Never).map_err(|err| Error::OffsetsRetrieveError { topic: topic.into(), err })?.to_topic_map();

    if let Some(offset) = committed_offsets.get(&(topic.into(), 0)) {
        let assign_result = match offset {
            Offset::Invalid => tpl.set_partition_offset(topic, 0, Offset::Beginning),
            offset => tpl.set_partition_offset(topic, 0, *offset),
        };
        assign_result.map_err(|err| Error::OffsetsAssignError { topic: topic.into(), err })?;
    }

    debug!("Restoring committed offsets for '{topic}': {:?}", &tpl);
    consumer.assign(&tpl).map_err(|err| Error::OffsetsRestoreError { topic: topic.into(), err })
}



/// A message delivered off a Broker queue, along with the handle needed to
/// acknowledge or (by dropping it) nack it.
pub struct Delivery {
    pub payload: Vec<u8>,
    pub job_id: Option<String>,
    /// How many times this message has been delivered, including this one.
    pub delivery_count: u32,
    inner: OwnedMessage,
}

impl Delivery {
    pub fn payload_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.payload)
    }
}

/// The narrow capability the rest of the system consumes the Broker through:
/// publish a work item onto a named queue, or pull the next message off one
/// with manual acknowledgement.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publishes `payload` onto `queue`, retrying transient failures up to
    /// `max_attempts` times. Returns `Error::PublishError`
    /// if every attempt failed.
    async fn publish(&self, queue: &str, job_id: &str, payload: &[u8], max_attempts: usize) -> Result<(), Error>;

    /// Pulls the next message off `queue`. Blocks until one is available.
    async fn consume(&self, queue: &str) -> Result<Delivery, Error>;

    /// Acknowledges `delivery`, permanently removing it from the queue.
    async fn ack(&self, queue: &str, delivery: Delivery) -> Result<(), Error>;

    /// Reports the approximate current length of `queue`, used by the API to
    /// enforce its backpressure ceiling.
    async fn queue_length(&self, queue: &str) -> Result<usize, Error>;
}



/// Kafka-backed `Broker` implementation.
pub struct KafkaBroker {
    brokers: String,
    producer: FutureProducer,
    consumers: std::collections::HashMap<String, StreamConsumer<DefaultConsumerContext>>,
    blackboard: Arc<dyn Blackboard>,
    max_delivery_count: u32,
}

impl KafkaBroker {
    /// Connects a producer and, for each of `queues`, a dedicated consumer
    /// group (one group per logical queue, so that two roles consuming
    /// different queues never steal each other's messages). `blackboard`
    /// backs the per-message delivery-count ledger `consume` enforces;
    /// `max_delivery_count` is the limit past which a message is
    /// dead-lettered instead of being handed to the caller.
    pub async fn connect(brokers: impl Into<String>, queues: &[&str], blackboard: Arc<dyn Blackboard>, max_delivery_count: u32) -> Result<Self, Error> {
        let brokers = brokers.into();
        ensure_topics(queues, &brokers).await?;

        let producer: FutureProducer =
            ClientConfig::new().set("bootstrap.servers", &brokers).create().map_err(|err| Error::ProducerCreateError { brokers: brokers.clone(), err })?;

        let mut consumers = std::collections::HashMap::new();
        for queue in queues {
            let consumer: StreamConsumer<DefaultConsumerContext> = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", format!("gsa-{queue}"))
                .set("enable.auto.commit", "false")
                .create()
                .map_err(|err| Error::ConsumerCreateError { brokers: brokers.clone(), err })?;
            restore_committed_offsets(&consumer, queue)?;
            consumers.insert((*queue).to_string(), consumer);
        }

        Ok(Self { brokers, producer, consumers, blackboard, max_delivery_count })
    }
}

/// Commits the offset just past `message`, the shared tail end of both a
/// normal ack and a dead-letter drop: either way, the queue must not hand
/// the message back out again.
fn commit_past(consumer: &StreamConsumer<DefaultConsumerContext>, queue: &str, message: &OwnedMessage) -> Result<(), Error> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(queue, message.partition(), Offset::Offset(message.offset() + 1)).map_err(|err| Error::AckError { queue: queue.to_string(), err })?;
    consumer.commit(&tpl, rdkafka::consumer::CommitMode::Async).map_err(|err| Error::AckError { queue: queue.to_string(), err })
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, queue: &str, job_id: &str, payload: &[u8], max_attempts: usize) -> Result<(), Error> {
        let mut last_err = String::new();
        for attempt in 1..=max_attempts.max(1) {
            let record = FutureRecord::to(queue).key(job_id).payload(payload);
            match self.producer.send(record, Timeout::After(Duration::from_secs(5))).await {
                Ok(_) => return Ok(()),
                Err((err, _)) => {
                    warn!("Attempt {attempt}/{max_attempts} to publish to queue '{queue}' failed: {err}");
                    last_err = err.to_string();
                }
            }
        }
        Err(Error::PublishError { queue: queue.to_string(), attempts: max_attempts, err: last_err })
    }

    async fn consume(&self, queue: &str) -> Result<Delivery, Error> {
        use tokio_stream::StreamExt;
        let consumer = self.consumers.get(queue).expect("queue was not registered at connect time");
        let mut stream = consumer.stream();

        loop {
            let message =
                stream.next().await.ok_or_else(|| Error::ConsumeError { queue: queue.to_string(), err: rdkafka::error::KafkaError::NoMessageReceived })?;
            let borrowed = message.map_err(|err| Error::ConsumeError { queue: queue.to_string(), err })?;
            let owned = borrowed.detach();
            let payload = owned.payload().map(|p| p.to_vec()).unwrap_or_default();
            let job_id = owned.key().and_then(|k| std::str::from_utf8(k).ok()).map(str::to_string);

            let delivery_count = match &job_id {
                Some(id) => match self.blackboard.atomic_increment(&format!("deliveries:{queue}:{id}")).await {
                    Ok(count) => count.min(u32::MAX as u64) as u32,
                    Err(err) => {
                        warn!("Failed to track delivery count for '{id}' on queue '{queue}': {err}; treating as first delivery");
                        1
                    }
                },
                // A keyless message can't be tracked against a per-job counter; let it through once.
                None => 1,
            };

            if delivery_count > self.max_delivery_count {
                warn!(
                    "Message '{}' on queue '{queue}' exceeded its delivery-count limit of {} after {delivery_count} deliveries; dead-lettering",
                    job_id.as_deref().unwrap_or("<keyless>"),
                    self.max_delivery_count
                );
                commit_past(consumer, queue, &owned)?;
                continue;
            }

            return Ok(Delivery { payload, job_id, delivery_count, inner: owned });
        }
    }

    async fn ack(&self, queue: &str, delivery: Delivery) -> Result<(), Error> {
        let consumer = self.consumers.get(queue).expect("queue was not registered at connect time");
        commit_past(consumer, queue, &delivery.inner)
    }

    async fn queue_length(&self, queue: &str) -> Result<usize, Error> {
        let consumer = self.consumers.get(queue).expect("queue was not registered at connect time");
        let watermarks = consumer
            .fetch_watermarks(queue, 0, Timeout::After(Duration::from_secs(5)))
            .map_err(|err| Error::OffsetsRetrieveError { topic: queue.to_string(), err })?;
        let committed = consumer.committed_offsets(
            { let mut tpl = TopicPartitionList::new(); tpl.add_partition(queue, 0); tpl },
            Timeout::After(Duration::from_secs(5)),
        ).map_err(|err| Error::OffsetsRetrieveError { topic: queue.to_string(), err })?;
        let consumed = committed.to_topic_map().get(&(queue.to_string(), 0)).and_then(|o| match o {
            Offset::Offset(n) => Some(*n),
            _ => None,
        }).unwrap_or(0);
        let (_, high) = watermarks;
        Ok((high - consumed).max(0) as usize)
    }
}

impl KafkaBroker {
    pub fn brokers(&self) -> &str {
        &self.brokers
    }
}
