//! Customer and address repository.

use sqlx::PgConnection;

use aurora_core::{AddressId, AddressKind, CountryCode, CustomerId, Email};

use super::RepositoryError;
use crate::models::{AddressInput, Customer};

/// Repository for customers and their addresses.
pub struct CustomerRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> CustomerRepository<'c> {
    /// Create a new customer repository.
    #[must_use]
    pub const fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Get-or-create the customer for `email` in one statement.
    ///
    /// Concurrent callers for the same email converge on one row through the
    /// unique index. A blank stored name is filled from `full_name`; a
    /// non-blank one is kept.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert(
        &mut self,
        email: &Email,
        full_name: &str,
    ) -> Result<Customer, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(
            r"
            INSERT INTO customers (customer_id, email, full_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE
            SET full_name = CASE
                WHEN customers.full_name = '' THEN EXCLUDED.full_name
                ELSE customers.full_name
            END
            RETURNING customer_id, email, full_name, created_at
            ",
        )
        .bind(CustomerId::generate())
        .bind(email)
        .bind(full_name.trim())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    /// Get a customer by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&mut self, email: &Email) -> Result<Option<Customer>, RepositoryError> {
        let customer = sqlx::query_as::<_, Customer>(
            r"
            SELECT customer_id, email, full_name, created_at
            FROM customers
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(&mut *self.conn)
        .await?;

        Ok(customer)
    }

    /// Append an address for a customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the customer does not exist.
    pub async fn insert_address(
        &mut self,
        customer_id: CustomerId,
        kind: AddressKind,
        address: &AddressInput,
        country: &CountryCode,
    ) -> Result<AddressId, RepositoryError> {
        let address_id = AddressId::generate();
        sqlx::query(
            r"
            INSERT INTO addresses
                (address_id, customer_id, kind, line1, line2, city, region, postal_code, country)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(address_id)
        .bind(customer_id)
        .bind(kind)
        .bind(address.line1.trim())
        .bind(address.line2.as_deref().map(str::trim).filter(|s| !s.is_empty()))
        .bind(address.city.trim())
        .bind(address.region.trim())
        .bind(address.postal_code.trim())
        .bind(country.as_str())
        .execute(&mut *self.conn)
        .await
        .map_err(|e| RepositoryError::from_write(e, "invalid address"))?;

        Ok(address_id)
    }
}
