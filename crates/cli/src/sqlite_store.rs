// Read-only `EvidenceStore` over an engine SQLite repository

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use matchlens_evidence::{EvidenceError, EvidenceStore, StoredFeature};

pub struct SqliteStore {
    conn: Connection,
}

fn store_error(e: rusqlite::Error) -> EvidenceError {
    EvidenceError::Store(e.to_string())
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, EvidenceError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| EvidenceError::Store(format!("cannot open {}: {}", path.display(), e)))?;

        // Fail at startup rather than on the first lookup
        conn.prepare("SELECT LIB_FEAT_ID FROM LIB_FEAT LIMIT 1")
            .map_err(|e| EvidenceError::Store(format!("{} is not an engine database: {}", path.display(), e)))?;
        Ok(Self { conn })
    }

    fn lib_feat_column(&self, column: &str, lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        let sql = format!("SELECT {} FROM LIB_FEAT WHERE LIB_FEAT_ID = ?1", column);
        let value: Option<Option<String>> = self
            .conn
            .query_row(&sql, params![lib_feat_id], |row| row.get(0))
            .optional()
            .map_err(store_error)?;
        Ok(value.flatten())
    }

    fn observed_entity(&self, dsrc_id: Option<i64>, record_id: &str) -> Result<Option<i64>, EvidenceError> {
        let base = "SELECT b.OBS_ENT_ID FROM DSRC_RECORD a \
                    JOIN OBS_ENT b ON b.ENT_SRC_KEY = a.ENT_SRC_KEY \
                    AND b.DSRC_ID = a.DSRC_ID AND b.ETYPE_ID = a.ETYPE_ID \
                    WHERE a.RECORD_ID = ?1";
        let found = match dsrc_id {
            Some(dsrc_id) => self
                .conn
                .query_row(&format!("{} AND a.DSRC_ID = ?2", base), params![record_id, dsrc_id], |row| {
                    row.get::<_, i64>(0)
                })
                .optional(),
            None => self
                .conn
                .query_row(base, params![record_id], |row| row.get::<_, i64>(0))
                .optional(),
        };
        found.map_err(store_error)
    }
}

impl EvidenceStore for SqliteStore {
    fn feature_element_values(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        self.lib_feat_column("FELEM_VALUES", lib_feat_id)
    }

    fn feature_description(&self, lib_feat_id: i64) -> Result<Option<String>, EvidenceError> {
        self.lib_feat_column("FEAT_DESC", lib_feat_id)
    }

    fn ambiguous_entity_set(
        &self,
        entity_id: i64,
        ambiguous_ftype_id: i64,
    ) -> Result<Option<Vec<i64>>, EvidenceError> {
        let holds_feature = self
            .conn
            .query_row(
                "SELECT 1 FROM RES_FEAT_EKEY WHERE RES_ENT_ID = ?1 AND FTYPE_ID = ?2",
                params![entity_id, ambiguous_ftype_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(store_error)?
            .is_some();
        if !holds_feature {
            return Ok(None);
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT a.REL_ENT_ID FROM RES_REL_EKEY a \
                 JOIN RES_RELATE b ON b.RES_REL_ID = a.RES_REL_ID \
                 WHERE a.RES_ENT_ID = ?1 AND b.IS_AMBIGUOUS = 1",
            )
            .map_err(store_error)?;
        let related = stmt
            .query_map(params![entity_id], |row| row.get::<_, i64>(0))
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        if related.is_empty() {
            return Ok(None);
        }

        let mut set = vec![entity_id];
        set.extend(related);
        Ok(Some(set))
    }

    fn record_features(
        &self,
        dsrc_id: Option<i64>,
        record_id: &str,
    ) -> Result<Option<Vec<StoredFeature>>, EvidenceError> {
        let Some(obs_ent_id) = self.observed_entity(dsrc_id, record_id)? else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare(
                "SELECT b.FTYPE_ID, b.LIB_FEAT_ID, b.FEAT_DESC FROM OBS_FEAT_EKEY a \
                 JOIN LIB_FEAT b ON b.LIB_FEAT_ID = a.LIB_FEAT_ID \
                 WHERE a.OBS_ENT_ID = ?1 ORDER BY b.FTYPE_ID",
            )
            .map_err(store_error)?;
        let features = stmt
            .query_map(params![obs_ent_id], |row| {
                Ok(StoredFeature {
                    ftype_id: row.get(0)?,
                    lib_feat_id: row.get(1)?,
                    feat_desc: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })
            .map_err(store_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(store_error)?;
        Ok(Some(features))
    }
}
