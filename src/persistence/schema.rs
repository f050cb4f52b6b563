//! Startup DDL.
//!
//! Plain SQL `CREATE TABLE IF NOT EXISTS` statements, executed once at
//! startup to pre-create the tables each repository expects: accounts,
//! positions, orders, trades, candles. Calling this is the embedding
//! application's responsibility before wiring up the Postgres-backed
//! repositories — this crate has no binary entry point of its own.

use sqlx::PgPool;

pub const CREATE_ACCOUNTS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    user_id      BIGINT PRIMARY KEY,
    cash_avail   NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (cash_avail >= 0),
    cash_frozen  NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (cash_frozen >= 0)
)";

pub const CREATE_POSITIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS positions (
    user_id        BIGINT PRIMARY KEY,
    shares_avail   BIGINT NOT NULL DEFAULT 0 CHECK (shares_avail >= 0),
    shares_frozen  BIGINT NOT NULL DEFAULT 0 CHECK (shares_frozen >= 0),
    avg_cost       NUMERIC(20, 4) NOT NULL DEFAULT 1
)";

pub const CREATE_ORDERS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id               BIGINT PRIMARY KEY,
    user_id          BIGINT NOT NULL,
    side             TEXT NOT NULL CHECK (side IN ('buy', 'sell')),
    method           TEXT NOT NULL CHECK (method IN ('limit', 'market')),
    price            NUMERIC(20, 4),
    qty              BIGINT NOT NULL CHECK (qty > 0),
    filled_qty       BIGINT NOT NULL DEFAULT 0 CHECK (filled_qty >= 0),
    status           TEXT NOT NULL,
    avg_fill_price   NUMERIC(20, 4),
    created_at       TIMESTAMPTZ NOT NULL,
    seq              BIGINT NOT NULL,
    reserved_cash    NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (reserved_cash >= 0),
    consumed_cash    NUMERIC(20, 2) NOT NULL DEFAULT 0 CHECK (consumed_cash >= 0 AND consumed_cash <= reserved_cash)
)";

pub const CREATE_ORDERS_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_orders_user ON orders (user_id, seq);
CREATE INDEX IF NOT EXISTS idx_orders_resting ON orders (side, status, price, seq)
    WHERE status IN ('open', 'partially_filled')
";

pub const CREATE_TRADES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id             BIGINT PRIMARY KEY,
    buy_order_id   BIGINT NOT NULL,
    sell_order_id  BIGINT NOT NULL,
    buyer_id       BIGINT NOT NULL,
    seller_id      BIGINT NOT NULL,
    price          NUMERIC(20, 4) NOT NULL,
    qty            BIGINT NOT NULL CHECK (qty > 0),
    executed_at    TIMESTAMPTZ NOT NULL
)";

pub const CREATE_CANDLES_TABLE: &str = "
CREATE TABLE IF NOT EXISTS candles (
    symbol     TEXT NOT NULL,
    period     TEXT NOT NULL,
    open_time  TIMESTAMPTZ NOT NULL,
    open       NUMERIC(20, 4) NOT NULL,
    high       NUMERIC(20, 4) NOT NULL,
    low        NUMERIC(20, 4) NOT NULL,
    close      NUMERIC(20, 4) NOT NULL,
    volume     BIGINT NOT NULL DEFAULT 0,
    is_flat    BOOLEAN NOT NULL DEFAULT FALSE,
    PRIMARY KEY (symbol, period, open_time)
)";

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(CREATE_ACCOUNTS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_POSITIONS_TABLE).execute(pool).await?;
    sqlx::query(CREATE_ORDERS_TABLE).execute(pool).await?;
    for stmt in CREATE_ORDERS_INDEXES.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(stmt).execute(pool).await?;
    }
    sqlx::query(CREATE_TRADES_TABLE).execute(pool).await?;
    sqlx::query(CREATE_CANDLES_TABLE).execute(pool).await?;
    Ok(())
}
