use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::PathBuf;

use crate::models::{
    Agent, BuyInOutRecord, CashDirection, Customer, CustomerRolling, Expense, FinancialSummary, Numeric,
    RollingRecord, Staff, Trip, TripAgent, TripCustomer, TripStatus,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(db_path: PathBuf) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_directory.sql",
                include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/001_create_directory.sql")),
            ),
            (
                "002_create_trips.sql",
                include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/002_create_trips.sql")),
            ),
            (
                "003_create_records_and_settings.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_records_and_settings.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    pub fn insert_agent(&self, agent: &Agent) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO agents (id, name, commission_rate, active, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![agent.id, agent.name, agent.commission_rate, agent.active, agent.created_at],
        )?;
        Ok(())
    }

    pub fn get_agent(&self, id: &str) -> SqlResult<Option<Agent>> {
        self.conn
            .query_row(
                "SELECT id, name, commission_rate, active, created_at FROM agents WHERE id = ?1",
                params![id],
                agent_from_row,
            )
            .optional()
    }

    pub fn list_agents(&self) -> SqlResult<Vec<Agent>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, commission_rate, active, created_at FROM agents ORDER BY name")?;
        let rows = stmt.query_map([], agent_from_row)?;
        rows.collect()
    }

    pub fn insert_customer(&self, customer: &Customer) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO customers (id, name, agent_id, rolling_percentage, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                customer.id,
                customer.name,
                customer.agent_id,
                customer.rolling_percentage,
                customer.active,
                customer.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_customer(&self, id: &str) -> SqlResult<Option<Customer>> {
        self.conn
            .query_row(
                "SELECT id, name, agent_id, rolling_percentage, active, created_at FROM customers WHERE id = ?1",
                params![id],
                customer_from_row,
            )
            .optional()
    }

    pub fn list_customers(&self, agent_id: Option<&str>) -> SqlResult<Vec<Customer>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, agent_id, rolling_percentage, active, created_at
             FROM customers
             WHERE ?1 IS NULL OR agent_id = ?1
             ORDER BY name",
        )?;
        let rows = stmt.query_map(params![agent_id], customer_from_row)?;
        rows.collect()
    }

    pub fn insert_staff(&self, staff: &Staff) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO staff (id, name, role, active, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![staff.id, staff.name, staff.role, staff.active, staff.created_at],
        )?;
        Ok(())
    }

    pub fn list_staff(&self) -> SqlResult<Vec<Staff>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, role, active, created_at FROM staff ORDER BY name")?;
        let rows = stmt.query_map([], staff_from_row)?;
        rows.collect()
    }

    pub fn get_staff(&self, id: &str) -> SqlResult<Option<Staff>> {
        self.conn
            .query_row(
                "SELECT id, name, role, active, created_at FROM staff WHERE id = ?1",
                params![id],
                staff_from_row,
            )
            .optional()
    }

    pub fn insert_trip(&self, trip: &Trip) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO trips (id, name, start_date, end_date, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                trip.id,
                trip.name,
                trip.start_date,
                trip.end_date,
                trip.status.as_str(),
                trip.created_at,
                trip.updated_at
            ],
        )?;
        Ok(())
    }

    /// Loads a trip together with its customers, agents and expenses.
    pub fn get_trip(&self, id: &str) -> SqlResult<Option<Trip>> {
        let trip = self
            .conn
            .query_row(
                "SELECT id, name, start_date, end_date, status, totals_json, created_at, updated_at
                 FROM trips WHERE id = ?1",
                params![id],
                trip_from_row,
            )
            .optional()?;

        let Some(mut trip) = trip else {
            return Ok(None);
        };
        trip.customers = self.get_trip_customers(id)?;
        trip.agents = self.get_trip_agents(id)?;
        trip.expenses = self.get_trip_expenses(id)?;
        Ok(Some(trip))
    }

    /// Trip headers only; related collections are left empty.
    pub fn list_trips(&self) -> SqlResult<Vec<Trip>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, start_date, end_date, status, totals_json, created_at, updated_at
             FROM trips
             ORDER BY start_date DESC",
        )?;
        let rows = stmt.query_map([], trip_from_row)?;
        rows.collect()
    }

    pub fn set_trip_status(&self, trip_id: &str, status: TripStatus) -> SqlResult<usize> {
        self.conn.execute(
            "UPDATE trips SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![trip_id, status.as_str(), crate::utils::now_rfc3339()],
        )
    }

    pub fn store_trip_totals(&self, trip_id: &str, totals: &FinancialSummary) -> SqlResult<()> {
        let json = serde_json::to_string(totals).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "UPDATE trips SET totals_json = ?2, updated_at = ?3 WHERE id = ?1",
            params![trip_id, json, crate::utils::now_rfc3339()],
        )?;
        Ok(())
    }

    pub fn upsert_trip_customer(&self, link: &TripCustomer) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO trip_customers (
                trip_id, customer_id, rolling_amount, win_loss, buy_in_amount, buy_out_amount, rolling_percentage
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                link.trip_id,
                link.customer_id,
                link.rolling_amount.as_option(),
                link.win_loss.as_option(),
                link.buy_in_amount.as_option(),
                link.buy_out_amount.as_option(),
                link.rolling_percentage.as_option()
            ],
        )?;
        Ok(())
    }

    pub fn get_trip_customers(&self, trip_id: &str) -> SqlResult<Vec<TripCustomer>> {
        let mut stmt = self.conn.prepare(
            "SELECT tc.trip_id, tc.customer_id, c.name, tc.rolling_amount, tc.win_loss,
                    tc.buy_in_amount, tc.buy_out_amount, tc.rolling_percentage
             FROM trip_customers tc
             LEFT JOIN customers c ON c.id = tc.customer_id
             WHERE tc.trip_id = ?1
             ORDER BY c.name",
        )?;

        let rows = stmt.query_map(params![trip_id], |row| {
            Ok(TripCustomer {
                trip_id: row.get(0)?,
                customer_id: row.get(1)?,
                customer_name: row.get(2)?,
                rolling_amount: Numeric::from(row.get::<_, Option<f64>>(3)?),
                win_loss: Numeric::from(row.get::<_, Option<f64>>(4)?),
                buy_in_amount: Numeric::from(row.get::<_, Option<f64>>(5)?),
                buy_out_amount: Numeric::from(row.get::<_, Option<f64>>(6)?),
                rolling_percentage: Numeric::from(row.get::<_, Option<f64>>(7)?),
            })
        })?;

        rows.collect()
    }

    /// Replaces a trip's agent links in one transaction.
    pub fn replace_trip_agents(&self, trip_id: &str, agents: &[TripAgent]) -> SqlResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM trip_agents WHERE trip_id = ?1", params![trip_id])?;
        for agent in agents {
            tx.execute(
                "INSERT INTO trip_agents (trip_id, agent_id, share_percentage, calculated_share, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    trip_id,
                    agent.agent_id,
                    agent.share_percentage,
                    agent.calculated_share,
                    agent.active
                ],
            )?;
        }
        tx.commit()
    }

    pub fn get_trip_agents(&self, trip_id: &str) -> SqlResult<Vec<TripAgent>> {
        let mut stmt = self.conn.prepare(
            "SELECT ta.trip_id, ta.agent_id, a.name, ta.share_percentage, ta.calculated_share, ta.active
             FROM trip_agents ta
             LEFT JOIN agents a ON a.id = ta.agent_id
             WHERE ta.trip_id = ?1
             ORDER BY a.name",
        )?;

        let rows = stmt.query_map(params![trip_id], |row| {
            Ok(TripAgent {
                trip_id: row.get(0)?,
                agent_id: row.get(1)?,
                agent_name: row.get(2)?,
                share_percentage: row.get(3)?,
                calculated_share: row.get(4)?,
                active: row.get(5)?,
            })
        })?;

        rows.collect()
    }

    pub fn insert_expense(&self, expense: &Expense) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO trip_expenses (id, trip_id, amount, category, description, recorded_at, recorded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                expense.id,
                expense.trip_id,
                expense.amount.as_option(),
                expense.category,
                expense.description,
                expense.recorded_at,
                expense.recorded_by
            ],
        )?;
        Ok(())
    }

    pub fn get_trip_expenses(&self, trip_id: &str) -> SqlResult<Vec<Expense>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, trip_id, amount, category, description, recorded_at, recorded_by
             FROM trip_expenses
             WHERE trip_id = ?1
             ORDER BY recorded_at",
        )?;

        let rows = stmt.query_map(params![trip_id], |row| {
            Ok(Expense {
                id: row.get(0)?,
                trip_id: row.get(1)?,
                amount: Numeric::from(row.get::<_, Option<f64>>(2)?),
                category: row.get(3)?,
                description: row.get(4)?,
                recorded_at: row.get(5)?,
                recorded_by: row.get(6)?,
            })
        })?;

        rows.collect()
    }

    pub fn insert_rolling_record(&self, record: &RollingRecord) -> SqlResult<()> {
        let ocr_json = record
            .ocr_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.conn.execute(
            "INSERT INTO rolling_records (
                id, customer_id, trip_id, staff_id, rolling_amount, win_loss, buy_in_amount, buy_out_amount,
                game_type, venue, table_number, receipt_hash, ocr_json, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                record.id,
                record.customer_id,
                record.trip_id,
                record.staff_id,
                record.rolling_amount,
                record.win_loss,
                record.buy_in_amount,
                record.buy_out_amount,
                record.game_type,
                record.venue,
                record.table_number,
                record.receipt_hash,
                ocr_json,
                record.recorded_at
            ],
        )?;
        Ok(())
    }

    pub fn get_rolling_records(
        &self,
        customer_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SqlResult<Vec<RollingRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, trip_id, staff_id, rolling_amount, win_loss, buy_in_amount, buy_out_amount,
                    game_type, venue, table_number, receipt_hash, ocr_json, recorded_at
             FROM rolling_records
             WHERE customer_id = ?1 AND (?2 IS NULL OR recorded_at >= ?2)
             ORDER BY recorded_at",
        )?;

        let rows = stmt.query_map(params![customer_id, since], |row| {
            let ocr_json: Option<String> = row.get(12)?;
            Ok(RollingRecord {
                id: row.get(0)?,
                customer_id: row.get(1)?,
                trip_id: row.get(2)?,
                staff_id: row.get(3)?,
                rolling_amount: row.get(4)?,
                win_loss: row.get(5)?,
                buy_in_amount: row.get(6)?,
                buy_out_amount: row.get(7)?,
                game_type: row.get(8)?,
                venue: row.get(9)?,
                table_number: row.get(10)?,
                receipt_hash: row.get(11)?,
                ocr_data: ocr_json.and_then(|json| serde_json::from_str(&json).ok()),
                recorded_at: row.get(13)?,
            })
        })?;

        rows.collect()
    }

    pub fn insert_cash_record(&self, record: &BuyInOutRecord) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO buy_in_out_records (
                id, customer_id, trip_id, staff_id, direction, amount, venue, table_number, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id,
                record.customer_id,
                record.trip_id,
                record.staff_id,
                record.direction.as_str(),
                record.amount,
                record.venue,
                record.table_number,
                record.recorded_at
            ],
        )?;
        Ok(())
    }

    pub fn get_cash_records(
        &self,
        customer_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> SqlResult<Vec<BuyInOutRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, customer_id, trip_id, staff_id, direction, amount, venue, table_number, recorded_at
             FROM buy_in_out_records
             WHERE customer_id = ?1 AND (?2 IS NULL OR recorded_at >= ?2)
             ORDER BY recorded_at",
        )?;

        let rows = stmt.query_map(params![customer_id, since], |row| {
            let direction: String = row.get(4)?;
            Ok(BuyInOutRecord {
                id: row.get(0)?,
                customer_id: row.get(1)?,
                trip_id: row.get(2)?,
                staff_id: row.get(3)?,
                direction: direction
                    .parse::<CashDirection>()
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
                amount: row.get(5)?,
                venue: row.get(6)?,
                table_number: row.get(7)?,
                recorded_at: row.get(8)?,
            })
        })?;

        rows.collect()
    }

    /// Rolling volume per customer referred by `agent_id`, with the rate that applies.
    ///
    /// A customer's own rolling percentage wins over the agent's default rate.
    pub fn get_agent_customer_rolling(&self, agent_id: &str) -> SqlResult<Vec<CustomerRolling>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.name, SUM(r.rolling_amount),
                    CASE WHEN c.rolling_percentage > 0 THEN c.rolling_percentage ELSE a.commission_rate END
             FROM customers c
             JOIN agents a ON a.id = c.agent_id
             LEFT JOIN rolling_records r ON r.customer_id = c.id
             WHERE c.agent_id = ?1
             GROUP BY c.id, c.name, c.rolling_percentage, a.commission_rate
             ORDER BY c.name",
        )?;

        let rows = stmt.query_map(params![agent_id], |row| {
            Ok(CustomerRolling {
                customer_id: row.get(0)?,
                customer_name: row.get(1)?,
                rolling_amount: Numeric::from(row.get::<_, Option<f64>>(2)?),
                commission_rate: Numeric::from(row.get::<_, Option<f64>>(3)?),
            })
        })?;

        rows.collect()
    }

    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> SqlResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0)).optional()
    }
}

fn agent_from_row(row: &Row<'_>) -> SqlResult<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        name: row.get(1)?,
        commission_rate: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn customer_from_row(row: &Row<'_>) -> SqlResult<Customer> {
    Ok(Customer {
        id: row.get(0)?,
        name: row.get(1)?,
        agent_id: row.get(2)?,
        rolling_percentage: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn staff_from_row(row: &Row<'_>) -> SqlResult<Staff> {
    Ok(Staff {
        id: row.get(0)?,
        name: row.get(1)?,
        role: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn trip_from_row(row: &Row<'_>) -> SqlResult<Trip> {
    let status: String = row.get(4)?;
    let totals_json: Option<String> = row.get(5)?;
    Ok(Trip {
        id: row.get(0)?,
        name: row.get(1)?,
        start_date: row.get::<_, NaiveDate>(2)?,
        end_date: row.get(3)?,
        status: status
            .parse::<TripStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, e.into()))?,
        customers: Vec::new(),
        agents: Vec::new(),
        expenses: Vec::new(),
        totals: totals_json.and_then(|json| serde_json::from_str(&json).ok()),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_agent(&Agent {
            id: "a1".to_string(),
            name: "Lucky Chan".to_string(),
            commission_rate: 1.0,
            active: true,
            created_at: "2024-01-01T00:00:00Z".to_string(),
        })
        .unwrap();
        for (id, name, rate) in [("c1", "Alice Wong", 1.4), ("c2", "Bob Lee", 0.0)] {
            db.insert_customer(&Customer {
                id: id.to_string(),
                name: name.to_string(),
                agent_id: Some("a1".to_string()),
                rolling_percentage: rate,
                active: true,
                created_at: "2024-01-01T00:00:00Z".to_string(),
            })
            .unwrap();
        }
        db.insert_trip(&Trip {
            id: "t1".to_string(),
            name: "Macau March".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()),
            status: TripStatus::Planned,
            customers: Vec::new(),
            agents: Vec::new(),
            expenses: Vec::new(),
            totals: None,
            created_at: "2024-02-01T00:00:00Z".to_string(),
            updated_at: "2024-02-01T00:00:00Z".to_string(),
        })
        .unwrap();
        db
    }

    fn session(id: &str, customer: &str, rolling: f64, at: DateTime<Utc>) -> RollingRecord {
        RollingRecord {
            id: id.to_string(),
            customer_id: customer.to_string(),
            trip_id: Some("t1".to_string()),
            staff_id: "s1".to_string(),
            rolling_amount: rolling,
            win_loss: -rolling / 20.0,
            buy_in_amount: 0.0,
            buy_out_amount: 0.0,
            game_type: Some("baccarat".to_string()),
            venue: None,
            table_number: None,
            receipt_hash: None,
            ocr_data: None,
            recorded_at: at,
        }
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        db.run_migrations().unwrap();
        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn trip_loads_with_its_collections() {
        let db = seeded();
        let mut link = TripCustomer::new("t1", "c1");
        link.rolling_amount = Numeric::Value(100_000.0);
        link.rolling_percentage = Numeric::Value(1.4);
        db.upsert_trip_customer(&link).unwrap();
        db.replace_trip_agents(
            "t1",
            &[TripAgent {
                trip_id: "t1".to_string(),
                agent_id: "a1".to_string(),
                agent_name: None,
                share_percentage: 30.0,
                calculated_share: 0.0,
                active: true,
            }],
        )
        .unwrap();
        db.insert_expense(&Expense {
            id: "e1".to_string(),
            trip_id: "t1".to_string(),
            amount: Numeric::Value(2_000.0),
            category: "hotel".to_string(),
            description: Some("Suites".to_string()),
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap(),
            recorded_by: Some("s1".to_string()),
        })
        .unwrap();

        let trip = db.get_trip("t1").unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Planned);
        assert_eq!(trip.customers.len(), 1);
        assert_eq!(trip.customers[0].customer_name.as_deref(), Some("Alice Wong"));
        assert_eq!(trip.customers[0].win_loss, Numeric::Missing);
        assert_eq!(trip.agents[0].agent_name.as_deref(), Some("Lucky Chan"));
        assert_eq!(trip.expenses[0].amount, Numeric::Value(2_000.0));
        assert!(db.get_trip("missing").unwrap().is_none());
    }

    #[test]
    fn trip_status_and_totals_persist() {
        let db = seeded();
        db.set_trip_status("t1", TripStatus::Completed).unwrap();
        let totals = FinancialSummary {
            net_result: 1_600.0,
            ..FinancialSummary::default()
        };
        db.store_trip_totals("t1", &totals).unwrap();
        let trip = db.get_trip("t1").unwrap().unwrap();
        assert_eq!(trip.status, TripStatus::Completed);
        assert_eq!(trip.totals, Some(totals));
    }

    #[test]
    fn record_queries_filter_by_customer_and_time() {
        let db = seeded();
        db.insert_rolling_record(&session("r1", "c1", 10_000.0, Utc.with_ymd_and_hms(2024, 2, 27, 20, 0, 0).unwrap()))
            .unwrap();
        db.insert_rolling_record(&session("r2", "c1", 40_000.0, Utc.with_ymd_and_hms(2024, 3, 2, 20, 0, 0).unwrap()))
            .unwrap();
        db.insert_rolling_record(&session("r3", "c2", 5_000.0, Utc.with_ymd_and_hms(2024, 3, 2, 21, 0, 0).unwrap()))
            .unwrap();

        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let records = db.get_rolling_records("c1", Some(since)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "r2");
        assert_eq!(db.get_rolling_records("c1", None).unwrap().len(), 2);
    }

    #[test]
    fn cash_records_round_trip_direction() {
        let db = seeded();
        db.insert_cash_record(&BuyInOutRecord {
            id: "b1".to_string(),
            customer_id: "c1".to_string(),
            trip_id: Some("t1".to_string()),
            staff_id: "s1".to_string(),
            direction: CashDirection::BuyOut,
            amount: 45_000.0,
            venue: Some("Venetian".to_string()),
            table_number: Some("8".to_string()),
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 3, 1, 0, 0).unwrap(),
        })
        .unwrap();
        let records = db.get_cash_records("c1", None).unwrap();
        assert_eq!(records[0].direction, CashDirection::BuyOut);
    }

    #[test]
    fn agent_rolling_prefers_customer_rate() {
        let db = seeded();
        db.insert_rolling_record(&session("r1", "c1", 100_000.0, Utc.with_ymd_and_hms(2024, 3, 2, 20, 0, 0).unwrap()))
            .unwrap();

        let rolling = db.get_agent_customer_rolling("a1").unwrap();
        assert_eq!(rolling.len(), 2);
        let alice = rolling.iter().find(|c| c.customer_id == "c1").unwrap();
        assert_eq!(alice.rolling_amount, Numeric::Value(100_000.0));
        assert_eq!(alice.commission_rate, Numeric::Value(1.4));
        let bob = rolling.iter().find(|c| c.customer_id == "c2").unwrap();
        assert_eq!(bob.rolling_amount, Numeric::Missing);
        assert_eq!(bob.commission_rate, Numeric::Value(1.0));
    }

    #[test]
    fn settings_overwrite() {
        let db = seeded();
        db.set_setting("poll_interval_secs", "20").unwrap();
        db.set_setting("poll_interval_secs", "25").unwrap();
        assert_eq!(db.get_setting("poll_interval_secs").unwrap().as_deref(), Some("25"));
        assert_eq!(db.get_setting("missing").unwrap(), None);
    }
}
