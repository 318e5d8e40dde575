// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{FromRow, query, query_as};
use transport_agreement_core::{ClientId, ContactId, Group, GroupId, Visibility};

use crate::groups::GroupStore;
use crate::sqlite::{DecodeError, SqliteError, SqliteStore};

impl<'a> GroupStore for SqliteStore<'a> {
    async fn add_group(&self, group: &Group) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    INSERT OR IGNORE
                    INTO
                        groups_v1 (
                            group_id,
                            client_id,
                            major_version,
                            descriptor
                        )
                    VALUES
                        (?, ?, ?, ?)
                    ",
                )
                .bind(group.id().to_hex())
                .bind(group.client_id().as_str())
                .bind(group.major_version() as i64)
                .bind(group.descriptor())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn contains_group(&self, id: &GroupId) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    SELECT
                        1
                    FROM
                        groups_v1
                    WHERE
                        group_id = ?
                    ",
                )
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.is_some())
    }

    async fn group(&self, id: &GroupId) -> Result<Option<Group>, SqliteError> {
        let row = self
            .tx(async |tx| {
                query_as::<_, GroupRow>(
                    "
                    SELECT
                        client_id,
                        major_version,
                        descriptor
                    FROM
                        groups_v1
                    WHERE
                        group_id = ?
                    ",
                )
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        row.map(Group::try_from).transpose()
    }

    async fn remove_group(&self, id: &GroupId) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                // Messages and visibilities are removed by cascading foreign keys.
                query(
                    "
                    DELETE FROM
                        groups_v1
                    WHERE
                        group_id = ?
                    ",
                )
                .bind(id.to_hex())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_group_contact(
        &self,
        id: &GroupId,
        contact_id: ContactId,
    ) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    UPDATE
                        groups_v1
                    SET
                        contact_id = ?
                    WHERE
                        group_id = ?
                    ",
                )
                .bind(contact_id.as_u32() as i64)
                .bind(id.to_hex())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn group_contact(&self, id: &GroupId) -> Result<Option<ContactId>, SqliteError> {
        let row: Option<(Option<i64>,)> = self
            .tx(async |tx| {
                query_as(
                    "
                    SELECT
                        contact_id
                    FROM
                        groups_v1
                    WHERE
                        group_id = ?
                    ",
                )
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        match row.and_then(|(contact_id,)| contact_id) {
            Some(value) => {
                let contact_id = u32::try_from(value)
                    .map_err(|_| SqliteError::Decode("contact_id".into(), DecodeError::OutOfRange))?;
                Ok(Some(ContactId::new(contact_id)))
            }
            None => Ok(None),
        }
    }

    async fn set_group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
        visibility: Visibility,
    ) -> Result<bool, SqliteError> {
        if !self.contains_group(id).await? {
            return Ok(false);
        }

        self.tx(async |tx| {
            query(
                "
                INSERT OR REPLACE
                INTO
                    group_visibilities_v1 (
                        contact_id,
                        group_id,
                        visibility
                    )
                VALUES
                    (?, ?, ?)
                ",
            )
            .bind(contact_id.as_u32() as i64)
            .bind(id.to_hex())
            .bind(visibility.to_u8() as i64)
            .execute(&mut **tx)
            .await
            .map_err(SqliteError::Sqlite)
        })
        .await?;
        Ok(true)
    }

    async fn group_visibility(
        &self,
        contact_id: ContactId,
        id: &GroupId,
    ) -> Result<Visibility, SqliteError> {
        let row: Option<(i64,)> = self
            .tx(async |tx| {
                query_as(
                    "
                    SELECT
                        visibility
                    FROM
                        group_visibilities_v1
                    WHERE
                        contact_id = ?
                        AND group_id = ?
                    ",
                )
                .bind(contact_id.as_u32() as i64)
                .bind(id.to_hex())
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        match row {
            Some((value,)) => u8::try_from(value)
                .ok()
                .and_then(Visibility::from_u8)
                .ok_or_else(|| SqliteError::Decode("visibility".into(), DecodeError::OutOfRange)),
            None => Ok(Visibility::default()),
        }
    }
}

#[derive(Debug, FromRow)]
struct GroupRow {
    client_id: String,
    major_version: i64,
    descriptor: Vec<u8>,
}

impl TryFrom<GroupRow> for Group {
    type Error = SqliteError;

    fn try_from(row: GroupRow) -> Result<Self, Self::Error> {
        let major_version = u32::try_from(row.major_version)
            .map_err(|_| SqliteError::Decode("major_version".into(), DecodeError::OutOfRange))?;
        Ok(Group::new(
            &ClientId::new(row.client_id),
            major_version,
            row.descriptor,
        ))
    }
}
