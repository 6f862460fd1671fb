use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::PgConnection;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

pub fn create_conn(database_url: &str) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().build(manager)
}

/// Formats an integer amount of cents for display in emails and admin views.
pub fn format_cents(amount_cents: i64, currency: &str) -> String {
    let dollars = amount_cents as f64 / 100.0;
    match currency.to_uppercase().as_str() {
        "USD" => format!("${:.2}", dollars),
        "EUR" => format!("€{:.2}", dollars),
        "GBP" => format!("£{:.2}", dollars),
        _ => format!("{:.2} {}", dollars, currency.to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_usd_cents() {
        assert_eq!(format_cents(2550, "usd"), "$25.50");
        assert_eq!(format_cents(0, "USD"), "$0.00");
    }

    #[test]
    fn formats_unknown_currency_with_code() {
        assert_eq!(format_cents(1000, "cad"), "10.00 CAD");
    }
}
