//! DynamoDB backend
//!
//! The SDK's own retry layer is disabled; every call goes through
//! [`RetryPolicy`] so throttling shows up in our logs and counts.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, DeleteRequest, KeySchemaElement, KeyType,
    ProvisionedThroughput, PutRequest, ReturnConsumedCapacity, ScalarAttributeType, WriteRequest,
};
use aws_sdk_dynamodb::Client;
use querybench_shared::{Cursor, Item, KeyValue, QueryResponse};
use tracing::{debug, info, warn};

use super::{CapacityMode, KeySchema, QueryStore, TableAdmin, TableDescription, TableStatus};
use crate::error::StoreError;
use crate::retry::{retry_with_backoff, RetryPolicy};

type AttributeMap = HashMap<String, AttributeValue>;

/// DynamoDB table client
#[derive(Debug, Clone)]
pub struct DynamoStore {
    client: Client,
    table_name: String,
    key_schema: KeySchema,
    retry: RetryPolicy,
}

impl DynamoStore {
    /// Connect using the default credential chain for `region`.
    ///
    /// `endpoint` overrides the regional endpoint (e.g. DynamoDB Local).
    pub async fn connect(
        table_name: &str,
        region: &str,
        endpoint: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<Self, StoreError> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .retry_config(aws_config::retry::RetryConfig::disabled())
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        info!(table = %table_name, region, endpoint = ?endpoint, "Connected to DynamoDB");

        Ok(Self::from_client(Client::from_conf(builder.build()), table_name, retry))
    }

    pub fn from_client(client: Client, table_name: &str, retry: RetryPolicy) -> Self {
        Self {
            client,
            table_name: table_name.to_string(),
            key_schema: KeySchema::default(),
            retry,
        }
    }

    /// Send write requests, re-sending unprocessed ones with backoff
    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<(), StoreError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut delay = self.retry.initial_delay();
        let mut pending = requests;
        let mut attempt = 1;

        while !pending.is_empty() {
            let client = &self.client;
            let table = self.table_name.as_str();
            let batch = &pending;
            let output = retry_with_backoff("BatchWriteItem", &self.retry, move || async move {
                client
                    .batch_write_item()
                    .request_items(table, batch.clone())
                    .send()
                    .await
                    .map_err(|e| classify("BatchWriteItem", e))
            })
            .await?;

            pending = output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                .unwrap_or_default();

            if pending.is_empty() {
                break;
            }
            if attempt >= max_attempts {
                return Err(StoreError::Throttled(format!(
                    "{} write requests still unprocessed after {} attempts",
                    pending.len(),
                    attempt
                )));
            }

            warn!(
                "{} unprocessed write requests (attempt {}/{}), re-sending",
                pending.len(),
                attempt,
                max_attempts
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.retry.max_delay());
            attempt += 1;
        }

        Ok(())
    }

    fn key_definitions(&self) -> Result<(Vec<AttributeDefinition>, Vec<KeySchemaElement>), StoreError> {
        let keys = [
            (&self.key_schema.partition_key, KeyType::Hash),
            (&self.key_schema.sort_key, KeyType::Range),
        ];

        let mut definitions = Vec::with_capacity(keys.len());
        let mut elements = Vec::with_capacity(keys.len());
        for (name, key_type) in keys {
            definitions.push(
                AttributeDefinition::builder()
                    .attribute_name(name)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            );
            elements.push(
                KeySchemaElement::builder()
                    .attribute_name(name)
                    .key_type(key_type)
                    .build()
                    .map_err(build_error)?,
            );
        }
        Ok((definitions, elements))
    }
}

#[async_trait]
impl QueryStore for DynamoStore {
    async fn query(
        &self,
        partition_key: &str,
        limit: u32,
        start_after: Option<&Cursor>,
    ) -> Result<QueryResponse, StoreError> {
        let output = self
            .client
            .query()
            .table_name(&self.table_name)
            .key_condition_expression("#pk = :pk")
            .expression_attribute_names("#pk", &self.key_schema.partition_key)
            .expression_attribute_values(":pk", AttributeValue::S(partition_key.to_string()))
            .limit(i32::try_from(limit).unwrap_or(i32::MAX))
            .set_exclusive_start_key(start_after.map(cursor_to_attributes))
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .await
            .map_err(|e| classify("Query", e))?;

        let count = u32::try_from(output.count)
            .map_err(|_| StoreError::Protocol(format!("negative item count {}", output.count)))?;

        let items = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(attributes_to_item)
            .collect::<Result<Vec<_>, _>>()?;

        let continuation = output
            .last_evaluated_key
            .map(attributes_to_cursor)
            .transpose()?;

        let consumed_capacity = output
            .consumed_capacity
            .and_then(|c| c.capacity_units)
            .unwrap_or(0.0);

        Ok(QueryResponse {
            items,
            count,
            continuation,
            consumed_capacity,
        })
    }
}

#[async_trait]
impl TableAdmin for DynamoStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    async fn describe(&self) -> Result<Option<TableDescription>, StoreError> {
        let client = &self.client;
        let table_name = self.table_name.as_str();
        let result = retry_with_backoff("DescribeTable", &self.retry, move || async move {
            client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| classify("DescribeTable", e))
        })
        .await;

        let table = match result {
            Ok(output) => output.table,
            Err(StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let Some(table) = table else {
            return Ok(None);
        };

        let status = match table.table_status.as_ref().map(|s| s.as_str()) {
            Some("ACTIVE") => TableStatus::Active,
            Some("CREATING") => TableStatus::Creating,
            Some("UPDATING") => TableStatus::Updating,
            Some("DELETING") => TableStatus::Deleting,
            Some(other) => TableStatus::Other(other.to_string()),
            None => TableStatus::Other("UNKNOWN".to_string()),
        };

        // BillingModeSummary is absent on tables that were always provisioned
        let on_demand = table
            .billing_mode_summary
            .and_then(|summary| summary.billing_mode)
            .is_some_and(|mode| mode == BillingMode::PayPerRequest);

        let capacity = if on_demand {
            CapacityMode::OnDemand
        } else {
            let throughput = table.provisioned_throughput;
            CapacityMode::Provisioned {
                rcu: throughput
                    .as_ref()
                    .and_then(|t| t.read_capacity_units)
                    .unwrap_or(0),
                wcu: throughput
                    .as_ref()
                    .and_then(|t| t.write_capacity_units)
                    .unwrap_or(0),
            }
        };

        Ok(Some(TableDescription { status, capacity }))
    }

    async fn create_table(&self, capacity: CapacityMode) -> Result<(), StoreError> {
        let (definitions, elements) = self.key_definitions()?;

        let mut request = self
            .client
            .create_table()
            .table_name(&self.table_name)
            .set_attribute_definitions(Some(definitions))
            .set_key_schema(Some(elements));

        request = match capacity {
            CapacityMode::OnDemand => request.billing_mode(BillingMode::PayPerRequest),
            CapacityMode::Provisioned { rcu, wcu } => request
                .billing_mode(BillingMode::Provisioned)
                .provisioned_throughput(throughput(rcu, wcu)?),
        };

        let request = &request;
        retry_with_backoff("CreateTable", &self.retry, move || async move {
            request
                .clone()
                .send()
                .await
                .map_err(|e| classify("CreateTable", e))
        })
        .await?;
        Ok(())
    }

    async fn update_capacity(&self, capacity: CapacityMode) -> Result<(), StoreError> {
        let mut request = self.client.update_table().table_name(&self.table_name);

        request = match capacity {
            CapacityMode::OnDemand => request.billing_mode(BillingMode::PayPerRequest),
            CapacityMode::Provisioned { rcu, wcu } => request
                .billing_mode(BillingMode::Provisioned)
                .provisioned_throughput(throughput(rcu, wcu)?),
        };

        let request = &request;
        retry_with_backoff("UpdateTable", &self.retry, move || async move {
            request
                .clone()
                .send()
                .await
                .map_err(|e| classify("UpdateTable", e))
        })
        .await?;
        Ok(())
    }

    async fn scan_keys(&self) -> Result<Vec<Item>, StoreError> {
        let client = &self.client;
        let table_name = self.table_name.as_str();
        let key_schema = &self.key_schema;
        let mut keys = Vec::new();
        let mut start_key: Option<AttributeMap> = None;

        loop {
            let start = start_key.take();
            let output = retry_with_backoff("Scan", &self.retry, move || {
                let start = start.clone();
                async move {
                    client
                        .scan()
                        .table_name(table_name)
                        .projection_expression("#pk, #sk")
                        .expression_attribute_names("#pk", &key_schema.partition_key)
                        .expression_attribute_names("#sk", &key_schema.sort_key)
                        .set_exclusive_start_key(start)
                        .send()
                        .await
                        .map_err(|e| classify("Scan", e))
                }
            })
            .await?;

            for attributes in output.items.unwrap_or_default() {
                keys.push(attributes_to_item(attributes)?);
            }
            debug!(scanned = keys.len(), "Scan page");

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn delete_keys(&self, keys: Vec<Item>) -> Result<(), StoreError> {
        let requests = keys
            .into_iter()
            .map(|key| {
                let request = DeleteRequest::builder()
                    .set_key(Some(item_to_attributes(key)))
                    .build()
                    .map_err(build_error)?;
                Ok(WriteRequest::builder().delete_request(request).build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.batch_write(requests).await
    }

    async fn put_items(&self, items: Vec<Item>) -> Result<(), StoreError> {
        let requests = items
            .into_iter()
            .map(|item| {
                let request = PutRequest::builder()
                    .set_item(Some(item_to_attributes(item)))
                    .build()
                    .map_err(build_error)?;
                Ok(WriteRequest::builder().put_request(request).build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.batch_write(requests).await
    }
}

fn throughput(rcu: i64, wcu: i64) -> Result<ProvisionedThroughput, StoreError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(rcu)
        .write_capacity_units(wcu)
        .build()
        .map_err(build_error)
}

fn build_error(e: impl std::fmt::Display) -> StoreError {
    StoreError::Fatal(format!("invalid request: {}", e))
}

/// Map an SDK error onto the retry classes
fn classify<E, R>(operation: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);
    let transport = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    let detail = format!("{} failed: {}", operation, DisplayErrorContext(err));

    if transport {
        return StoreError::Transient(detail);
    }
    classify_code(code.as_deref(), detail)
}

/// Classify a service error by its error code
fn classify_code(code: Option<&str>, detail: String) -> StoreError {
    match code {
        Some("ProvisionedThroughputExceededException")
        | Some("ThrottlingException")
        | Some("RequestLimitExceeded") => StoreError::Throttled(detail),
        Some("ResourceNotFoundException") => StoreError::NotFound(detail),
        Some("InternalServerError") | Some("ServiceUnavailable") => StoreError::Transient(detail),
        _ => StoreError::Fatal(detail),
    }
}

fn item_to_attributes(item: Item) -> AttributeMap {
    item.into_iter()
        .map(|(name, value)| (name, AttributeValue::S(value)))
        .collect()
}

fn attributes_to_item(attributes: AttributeMap) -> Result<Item, StoreError> {
    attributes
        .into_iter()
        .map(|(name, value)| match value {
            AttributeValue::S(s) | AttributeValue::N(s) => Ok((name, s)),
            AttributeValue::Bool(b) => Ok((name, b.to_string())),
            other => Err(StoreError::Protocol(format!(
                "attribute '{}' has unsupported type {:?}",
                name, other
            ))),
        })
        .collect()
}

fn cursor_to_attributes(cursor: &Cursor) -> AttributeMap {
    cursor
        .iter()
        .map(|(name, value)| {
            let value = match value {
                KeyValue::S(s) => AttributeValue::S(s.clone()),
                KeyValue::N(n) => AttributeValue::N(n.clone()),
                KeyValue::B(b) => AttributeValue::B(Blob::new(b.clone())),
            };
            (name.clone(), value)
        })
        .collect()
}

fn attributes_to_cursor(attributes: AttributeMap) -> Result<Cursor, StoreError> {
    attributes
        .into_iter()
        .map(|(name, value)| match value {
            AttributeValue::S(s) => Ok((name, KeyValue::S(s))),
            AttributeValue::N(n) => Ok((name, KeyValue::N(n))),
            AttributeValue::B(b) => Ok((name, KeyValue::B(b.into_inner()))),
            other => Err(StoreError::Protocol(format!(
                "key attribute '{}' has unsupported type {:?}",
                name, other
            ))),
        })
        .collect()
}
