// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{FromRow, query, query_as};
use transport_agreement_core::{
    Dictionary, FormatError, GroupId, HashError, Message, MessageId,
};

use crate::messages::MessageStore;
use crate::sqlite::{DecodeError, SqliteError, SqliteStore, decode_err};

impl<'a> MessageStore for SqliteStore<'a> {
    async fn insert_message(
        &self,
        message: &Message,
        metadata: &Dictionary,
    ) -> Result<bool, SqliteError> {
        let metadata = metadata
            .to_bytes()
            .map_err(|err| SqliteError::Encode("metadata".to_string(), err))?;

        let result = self
            .tx(async |tx| {
                query(
                    "
                    INSERT OR IGNORE
                    INTO
                        messages_v1 (
                            message_id,
                            group_id,
                            timestamp,
                            body,
                            metadata
                        )
                    VALUES
                        (?, ?, ?, ?, ?)
                    ",
                )
                .bind(message.id().to_hex())
                .bind(message.group_id().to_hex())
                .bind(message.timestamp() as i64)
                .bind(message.body())
                .bind(metadata.as_slice())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn message(&self, id: &MessageId) -> Result<Option<Message>, SqliteError> {
        let row = self
            .tx(async |tx| {
                query_as::<_, MessageRow>(
                    "
                    SELECT
                        group_id,
                        timestamp,
                        body
                    FROM
                        messages_v1
                    WHERE
                        message_id = ?
                    ",
                )
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn message_metadata(&self, id: &MessageId) -> Result<Option<Dictionary>, SqliteError> {
        let row: Option<(Vec<u8>,)> = self
            .tx(async |tx| {
                query_as(
                    "
                    SELECT
                        metadata
                    FROM
                        messages_v1
                    WHERE
                        message_id = ?
                    ",
                )
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        row.map(|(bytes,)| decode_metadata(&bytes)).transpose()
    }

    async fn merge_message_metadata(
        &self,
        id: &MessageId,
        metadata: &Dictionary,
    ) -> Result<bool, SqliteError> {
        let Some(mut merged) = self.message_metadata(id).await? else {
            return Ok(false);
        };
        merged.merge(metadata);
        let bytes = merged
            .to_bytes()
            .map_err(|err| SqliteError::Encode("metadata".to_string(), err))?;

        let result = self
            .tx(async |tx| {
                query(
                    "
                    UPDATE
                        messages_v1
                    SET
                        metadata = ?
                    WHERE
                        message_id = ?
                    ",
                )
                .bind(bytes.as_slice())
                .bind(id.to_hex())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn message_ids(
        &self,
        group_id: &GroupId,
        query: &Dictionary,
    ) -> Result<Vec<MessageId>, SqliteError> {
        // Metadata is stored as an opaque blob, matching happens after decoding.
        Ok(self
            .messages_metadata(group_id)
            .await?
            .into_iter()
            .filter(|(_, metadata)| metadata.matches(query))
            .map(|(id, _)| id)
            .collect())
    }

    async fn messages_metadata(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<(MessageId, Dictionary)>, SqliteError> {
        let rows: Vec<(String, Vec<u8>)> = self
            .tx(async |tx| {
                query_as(
                    "
                    SELECT
                        message_id,
                        metadata
                    FROM
                        messages_v1
                    WHERE
                        group_id = ?
                    ORDER BY
                        sequence ASC
                    ",
                )
                .bind(group_id.to_hex())
                .fetch_all(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        rows.into_iter()
            .map(|(id, bytes)| {
                let id: MessageId = id.parse().map_err(decode_err::<HashError>("message_id"))?;
                Ok((id, decode_metadata(&bytes)?))
            })
            .collect()
    }
}

fn decode_metadata(bytes: &[u8]) -> Result<Dictionary, SqliteError> {
    Dictionary::from_bytes(bytes).map_err(decode_err::<FormatError>("metadata"))
}

#[derive(Debug, FromRow)]
struct MessageRow {
    group_id: String,
    timestamp: i64,
    body: Vec<u8>,
}

impl TryFrom<MessageRow> for Message {
    type Error = SqliteError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let group_id: GroupId = row
            .group_id
            .parse()
            .map_err(decode_err::<HashError>("group_id"))?;
        let timestamp = u64::try_from(row.timestamp)
            .map_err(|_| SqliteError::Decode("timestamp".into(), DecodeError::OutOfRange))?;
        Ok(Message::new(group_id, timestamp, row.body))
    }
}
