use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};
use time::OffsetDateTime;

/// Timestamp wrapper with sqlx Encode/Decode (SQLite stores unix seconds
/// as INTEGER, always UTC).
///
/// Sub-second precision does not survive a round trip through the
/// database. Comparisons against stored values must happen at second
/// granularity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DTimestamp(OffsetDateTime);

impl DTimestamp {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }
}

impl From<DTimestamp> for OffsetDateTime {
    fn from(val: DTimestamp) -> Self {
        val.0
    }
}

impl From<OffsetDateTime> for DTimestamp {
    fn from(at: OffsetDateTime) -> Self {
        Self(at)
    }
}

impl std::ops::Deref for DTimestamp {
    type Target = OffsetDateTime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DTimestamp {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let secs = <i64 as Decode<Sqlite>>::decode(value)?;
        let at = OffsetDateTime::from_unix_timestamp(secs)?;
        Ok(Self(at))
    }
}

impl Encode<'_, Sqlite> for DTimestamp {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Int64(self.0.unix_timestamp()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DTimestamp {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <i64 as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <i64 as Type<Sqlite>>::type_info()
    }
}
