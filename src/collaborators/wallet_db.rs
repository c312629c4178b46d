use crate::collaborators::{WalletAddress, WalletSnapshot, WalletSource};
use crate::compose_utils::derivation_mapper::DerivationPath;
use crate::utxo::Utxo;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use std::path::PathBuf;

const UTXO_QUERY: &str = "\
WITH utxo_table AS (
    SELECT input_tx_id || '#' || input_index AS utxo, output_coin, output_address
    FROM utxo WHERE slot = (SELECT max(slot) FROM utxo)
),
utxo_asset_table AS (
    SELECT tx_id || '#' || tx_index AS utxo_asset
    FROM utxo_token WHERE slot = (SELECT max(slot) FROM utxo_token)
)
SELECT utxo, output_coin, output_address FROM utxo_table
WHERE utxo NOT IN (SELECT DISTINCT utxo_asset FROM utxo_asset_table)
ORDER BY output_coin ASC, utxo ASC";

const ASSET_UTXO_COUNT_QUERY: &str = "\
WITH utxo_asset_table AS (
    SELECT tx_id || '#' || tx_index AS utxo_asset
    FROM utxo_token WHERE slot = (SELECT max(slot) FROM utxo_token)
)
SELECT COUNT(DISTINCT utxo_asset) FROM utxo_asset_table WHERE utxo_asset NOT NULL";

const ADDRESS_QUERY: &str = "\
SELECT address, account_ix, address_ix, status FROM rnd_state_address
WHERE rnd_state_address.slot = (SELECT max(slot) FROM rnd_state_address)
UNION
SELECT address, account_ix, address_ix, 'unused' AS status FROM rnd_state_pending_address";

/// Read-only view of a cardano-wallet random-wallet sqlite database.
#[derive(Debug, Clone)]
pub struct WalletDb {
    db_path: PathBuf,
}

impl WalletDb {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn connection(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| {
            format!(
                "failed to open wallet database '{}'",
                self.db_path.display()
            )
        })
    }

    pub fn read_snapshot(&self) -> Result<WalletSnapshot> {
        let conn = self.connection()?;
        let utxos = query_utxos(&conn)?;
        if utxos.is_empty() {
            return Err(anyhow!("No UTxO found at {}", self.db_path.display()));
        }
        let asset_utxo_count = query_asset_utxo_count(&conn)?;
        let addresses = query_addresses(&conn)?;
        if addresses.is_empty() {
            return Err(anyhow!("No addresses found at {}", self.db_path.display()));
        }
        Ok(WalletSnapshot {
            utxos,
            asset_utxo_count,
            addresses,
        })
    }
}

#[async_trait]
impl WalletSource for WalletDb {
    async fn snapshot(&self) -> anyhow::Result<WalletSnapshot> {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.read_snapshot())
            .await
            .context("wallet database read panicked")?
    }
}

fn query_utxos(conn: &Connection) -> Result<Vec<Utxo>> {
    let mut stmt = conn
        .prepare(UTXO_QUERY)
        .context("failed to prepare the wallet utxo query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to fetch wallet utxos")?;

    rows.into_iter()
        .map(|(id, coin, address)| {
            let value = u64::try_from(coin).map_err(|_| anyhow!("utxo {} has a negative value", id))?;
            Ok(Utxo::new(id, value, base58_address(&address)?))
        })
        .collect()
}

fn query_asset_utxo_count(conn: &Connection) -> Result<u64> {
    let count: i64 = conn
        .query_row(ASSET_UTXO_COUNT_QUERY, [], |row| row.get(0))
        .context("failed to fetch the asset utxo count")?;
    u64::try_from(count).map_err(|_| anyhow!("asset utxo count is negative: {}", count))
}

fn query_addresses(conn: &Connection) -> Result<Vec<WalletAddress>> {
    let mut stmt = conn
        .prepare(ADDRESS_QUERY)
        .context("failed to prepare the wallet address query")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to fetch wallet addresses")?;

    rows.into_iter()
        .map(|(address, account_ix, address_ix, status)| {
            let path = DerivationPath::from_wallet_indices(
                u64::try_from(account_ix)?,
                u64::try_from(address_ix)?,
            )?;
            Ok(WalletAddress {
                address: base58_address(&address)?,
                path,
                status,
            })
        })
        .collect()
}

/// The wallet stores Byron addresses as hex; the node tools expect base58.
pub fn base58_address(hex_address: &str) -> Result<String> {
    let bytes = hex::decode(hex_address)
        .with_context(|| format!("wallet address is not hex: {}", hex_address))?;
    Ok(bs58::encode(bytes).into_string())
}

#[cfg(test)]
mod tests {
    use crate::collaborators::wallet_db::{base58_address, WalletDb};
    use crate::collaborators::WalletSource;
    use crate::compose_utils::derivation_mapper::{DerivationPath, HARDENED_OFFSET};
    use rusqlite::{params, Connection};
    use tempfile::TempDir;

    const SCHEMA: &str = "
        CREATE TABLE utxo (input_tx_id TEXT, input_index INTEGER, output_coin INTEGER, output_address TEXT, slot INTEGER);
        CREATE TABLE utxo_token (tx_id TEXT, tx_index INTEGER, token_policy_id TEXT, token_name TEXT, token_value INTEGER, slot INTEGER);
        CREATE TABLE rnd_state_address (address TEXT, account_ix INTEGER, address_ix INTEGER, status TEXT, slot INTEGER);
        CREATE TABLE rnd_state_pending_address (address TEXT, account_ix INTEGER, address_ix INTEGER);
    ";

    fn wallet_db(dir: &TempDir) -> WalletDb {
        let path = dir.path().join("rnd.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let utxos = [
            ("aa", 0, 5_000_000, "0102", 10),
            ("bb", 1, 1_000_000, "0102", 10),
            ("cc", 0, 3_000_000, "0a0b", 10),
            ("dd", 2, 7_000_000, "0a0b", 10),
            ("ee", 0, 9_000_000, "0102", 9),
        ];
        for (tx, ix, coin, address, slot) in utxos {
            conn.execute(
                "INSERT INTO utxo VALUES (?1, ?2, ?3, ?4, ?5)",
                params![tx, ix, coin, address, slot],
            )
            .unwrap();
        }
        conn.execute(
            "INSERT INTO utxo_token VALUES ('dd', 2, 'policy', 'token', 1, 10)",
            [],
        )
        .unwrap();

        let hardened = HARDENED_OFFSET as i64;
        conn.execute(
            "INSERT INTO rnd_state_address VALUES ('0102', ?1, ?2, 'used', 10)",
            params![hardened, hardened + 7],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rnd_state_address VALUES ('ffff', 0, 1, 'used', 3)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rnd_state_pending_address VALUES ('0a0b', ?1, ?2)",
            params![hardened, hardened + 9],
        )
        .unwrap();

        WalletDb::new(path)
    }

    #[test]
    fn hex_to_base58() {
        assert_eq!(base58_address("0102").unwrap(), "5T");
        assert!(base58_address("zz").is_err());
    }

    #[tokio::test]
    async fn reads_latest_slot_snapshot() {
        let dir = TempDir::new().unwrap();
        let snapshot = wallet_db(&dir).snapshot().await.unwrap();

        let ids: Vec<_> = snapshot.utxos.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["bb#1", "cc#0", "aa#0"]);
        assert_eq!(snapshot.utxos[0].address, "5T");
        assert_eq!(snapshot.asset_utxo_count, 1);

        assert_eq!(snapshot.addresses.len(), 2);
        let pending = snapshot
            .addresses
            .iter()
            .find(|entry| entry.status == "unused")
            .unwrap();
        assert_eq!(pending.path, DerivationPath::new(0, 9));
        let used = snapshot
            .addresses
            .iter()
            .find(|entry| entry.status == "used")
            .unwrap();
        assert_eq!(used.address, "5T");
        assert_eq!(used.path, DerivationPath::new(0, 7));

        let stats = snapshot.stats();
        assert_eq!(stats.utxo_count, 3);
        assert_eq!(stats.address_count, 2);
        assert_eq!(stats.lovelace, 9_000_000);
    }

    #[test]
    fn empty_wallet_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.sqlite");
        Connection::open(&path).unwrap().execute_batch(SCHEMA).unwrap();
        assert!(WalletDb::new(path).read_snapshot().is_err());
    }

    #[test]
    fn missing_database_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(WalletDb::new(dir.path().join("nope.sqlite")).read_snapshot().is_err());
    }
}
