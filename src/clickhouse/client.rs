//! ClickHouse sink client over the HTTP interface.
//!
//! Each batch becomes one `INSERT ... FORMAT JSONEachRow` request: the row
//! objects are sent one JSON document per line, with the column list spelled
//! out in the query so ClickHouse rejects shape mismatches instead of
//! filling defaults. Transport failures map to connection errors; a non-2xx
//! response is a whole-batch write failure carrying the server's reply.

use tracing::debug;

use crate::config::SinkConfig;
use crate::event::Row;
use crate::writer::SinkClient;
use crate::{Error, Result};

pub struct ClickHouseClient {
    http: reqwest::Client,
    endpoint: String,
    user: String,
    password: String,
}

impl ClickHouseClient {
    pub fn new(config: &SinkConfig) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint(),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

impl SinkClient for ClickHouseClient {
    async fn insert(
        &mut self,
        schema: &str,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> Result<()> {
        let query = insert_query(schema, table, columns);

        let mut body = String::with_capacity(rows.len() * 64);
        for row in rows {
            body.push_str(&serde_json::to_string(row)?);
            body.push('\n');
        }

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("query", query.as_str())])
            .header("X-ClickHouse-User", self.user.as_str())
            .header("X-ClickHouse-Key", self.password.as_str())
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Connection(format!("ClickHouse unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::BatchWrite {
                schema: schema.to_string(),
                table: table.to_string(),
                message: format!("{}: {}", status, detail.trim()),
            });
        }

        debug!(
            schema = %schema,
            table = %table,
            rows = rows.len(),
            "Inserted batch"
        );
        Ok(())
    }
}

fn insert_query(schema: &str, table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO `{}`.`{}` ({}) FORMAT JSONEachRow",
        schema, table, column_list
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_query_shape() {
        let columns = vec!["id".to_string(), "amount".to_string()];
        assert_eq!(
            insert_query("db1", "orders", &columns),
            "INSERT INTO `db1`.`orders` (`id`, `amount`) FORMAT JSONEachRow"
        );
    }
}
