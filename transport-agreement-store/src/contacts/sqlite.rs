// SPDX-License-Identifier: MIT OR Apache-2.0

use sqlx::{FromRow, query, query_as};
use transport_agreement_core::{AuthorId, Contact, ContactId, HashError};

use crate::contacts::ContactStore;
use crate::sqlite::{DecodeError, SqliteError, SqliteStore, decode_err};

impl<'a> ContactStore for SqliteStore<'a> {
    async fn insert_contact(&self, contact: &Contact) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    INSERT OR IGNORE
                    INTO
                        contacts_v1 (
                            contact_id,
                            author_id
                        )
                    VALUES
                        (?, ?)
                    ",
                )
                .bind(contact.id().as_u32() as i64)
                .bind(contact.author_id().to_hex())
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn contact(&self, id: ContactId) -> Result<Option<Contact>, SqliteError> {
        let row = self
            .tx(async |tx| {
                query_as::<_, ContactRow>(
                    "
                    SELECT
                        contact_id,
                        author_id
                    FROM
                        contacts_v1
                    WHERE
                        contact_id = ?
                    ",
                )
                .bind(id.as_u32() as i64)
                .fetch_optional(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        row.map(Contact::try_from).transpose()
    }

    async fn contacts(&self) -> Result<Vec<Contact>, SqliteError> {
        let rows = self
            .tx(async |tx| {
                query_as::<_, ContactRow>(
                    "
                    SELECT
                        contact_id,
                        author_id
                    FROM
                        contacts_v1
                    ORDER BY
                        contact_id ASC
                    ",
                )
                .fetch_all(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;

        rows.into_iter().map(Contact::try_from).collect()
    }

    async fn remove_contact(&self, id: ContactId) -> Result<bool, SqliteError> {
        let result = self
            .tx(async |tx| {
                query(
                    "
                    DELETE FROM
                        group_visibilities_v1
                    WHERE
                        contact_id = ?
                    ",
                )
                .bind(id.as_u32() as i64)
                .execute(&mut **tx)
                .await?;

                // Transport key sets are removed by the cascading foreign key.
                query(
                    "
                    DELETE FROM
                        contacts_v1
                    WHERE
                        contact_id = ?
                    ",
                )
                .bind(id.as_u32() as i64)
                .execute(&mut **tx)
                .await
                .map_err(SqliteError::Sqlite)
            })
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, FromRow)]
struct ContactRow {
    contact_id: i64,
    author_id: String,
}

impl TryFrom<ContactRow> for Contact {
    type Error = SqliteError;

    fn try_from(row: ContactRow) -> Result<Self, Self::Error> {
        let contact_id = u32::try_from(row.contact_id)
            .map_err(|_| SqliteError::Decode("contact_id".into(), DecodeError::OutOfRange))?;
        let author_id: AuthorId = row
            .author_id
            .parse()
            .map_err(decode_err::<HashError>("author_id"))?;
        Ok(Contact::new(ContactId::new(contact_id), author_id))
    }
}
