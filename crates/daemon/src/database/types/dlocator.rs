use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};

use blob_store::BlobLocator;

/// Blob locator wrapper with sqlx Encode/Decode (SQLite stores the
/// canonical `backend:key` TEXT form)
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DLocator(BlobLocator);

impl From<DLocator> for BlobLocator {
    fn from(val: DLocator) -> Self {
        val.0
    }
}

impl From<BlobLocator> for DLocator {
    fn from(locator: BlobLocator) -> Self {
        Self(locator)
    }
}

impl std::ops::Deref for DLocator {
    type Target = BlobLocator;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DLocator {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let s = <String as Decode<Sqlite>>::decode(value)?;
        let locator = s.parse::<BlobLocator>()?;
        Ok(Self(locator))
    }
}

impl Encode<'_, Sqlite> for DLocator {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'_>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Text(self.0.to_string().into()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DLocator {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }
}
