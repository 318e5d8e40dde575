// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use sqlx::{FromRow, query, query_as};
use transport_agreement_core::{ContactId, KeySetId, TransportId, TransportIdError};

use crate::keys::{TransportKeySet, TransportKeyStore};
use crate::sqlite::{DecodeError, SqliteError, SqliteStore, decode_err};

impl<'a> TransportKeyStore for SqliteStore<'a> {
    async fn insert_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
        epoch: u64,
        alice: bool,
        active: bool,
    ) -> Result<KeySetId, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    INSERT
                    INTO
                        transport_keys_v1 (
                            contact_id,
                            transport_id,
                            epoch,
                            alice,
                            active
                        )
                    VALUES
                        (?, ?, ?, ?, ?)
                    ",
                )
                .bind(contact_id.as_u32() as i64)
                .bind(transport_id.as_str())
                .bind(epoch as i64)
                .bind(alice)
                .bind(active)
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        let key_set_id = u64::try_from(result.last_insert_rowid())
            .map_err(|_| SqliteError::Decode("key_set_id".into(), DecodeError::OutOfRange))?;
        Ok(KeySetId::new(key_set_id))
    }

    async fn set_transport_keys_active(
        &self,
        transport_id: &TransportId,
        key_set_id: KeySetId,
    ) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    UPDATE
                        transport_keys_v1
                    SET
                        active = 1
                    WHERE
                        key_set_id = ?
                        AND transport_id = ?
                    ",
                )
                .bind(key_set_id.as_u64() as i64)
                .bind(transport_id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn contains_transport_keys(
        &self,
        contact_id: ContactId,
        transport_id: &TransportId,
    ) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    SELECT
                        1
                    FROM
                        transport_keys_v1
                    WHERE
                        contact_id = ?
                        AND transport_id = ?
                    LIMIT 1
                    ",
                )
                .bind(contact_id.as_u32() as i64)
                .bind(transport_id.as_str())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.is_some())
    }

    async fn transports_with_keys(
        &self,
    ) -> Result<HashMap<ContactId, Vec<TransportId>>, SqliteError> {
        let rows: Vec<(i64, String)> = self
            .tx(async |tx| {
                query_as(
                    "
                    SELECT DISTINCT
                        contact_id,
                        transport_id
                    FROM
                        transport_keys_v1
                    ORDER BY
                        contact_id, transport_id
                    ",
                )
                .fetch_all(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        let mut result: HashMap<ContactId, Vec<TransportId>> = HashMap::new();
        for (contact_id, transport_id) in rows {
            let contact_id = decode_contact_id(contact_id)?;
            let transport_id =
                TransportId::new(transport_id).map_err(decode_err::<TransportIdError>("transport_id"))?;
            result.entry(contact_id).or_default().push(transport_id);
        }
        Ok(result)
    }

    async fn transport_keys(
        &self,
        key_set_id: KeySetId,
    ) -> Result<Option<TransportKeySet>, SqliteError> {
        let row = self
            .tx(async |tx| {
                query_as::<_, TransportKeysRow>(
                    "
                    SELECT
                        key_set_id,
                        contact_id,
                        transport_id,
                        epoch,
                        alice,
                        active
                    FROM
                        transport_keys_v1
                    WHERE
                        key_set_id = ?
                    ",
                )
                .bind(key_set_id.as_u64() as i64)
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        row.map(TransportKeySet::try_from).transpose()
    }
}

fn decode_contact_id(value: i64) -> Result<ContactId, SqliteError> {
    u32::try_from(value)
        .map(ContactId::new)
        .map_err(|_| SqliteError::Decode("contact_id".into(), DecodeError::OutOfRange))
}

#[derive(Debug, FromRow)]
struct TransportKeysRow {
    key_set_id: i64,
    contact_id: i64,
    transport_id: String,
    epoch: i64,
    alice: bool,
    active: bool,
}

impl TryFrom<TransportKeysRow> for TransportKeySet {
    type Error = SqliteError;

    fn try_from(row: TransportKeysRow) -> Result<Self, Self::Error> {
        let key_set_id = u64::try_from(row.key_set_id)
            .map_err(|_| SqliteError::Decode("key_set_id".into(), DecodeError::OutOfRange))?;
        let epoch = u64::try_from(row.epoch)
            .map_err(|_| SqliteError::Decode("epoch".into(), DecodeError::OutOfRange))?;
        Ok(TransportKeySet {
            key_set_id: KeySetId::new(key_set_id),
            contact_id: decode_contact_id(row.contact_id)?,
            transport_id: TransportId::new(row.transport_id)
                .map_err(decode_err::<TransportIdError>("transport_id"))?,
            epoch,
            alice: row.alice,
            active: row.active,
        })
    }
}
