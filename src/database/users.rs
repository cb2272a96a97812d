use diesel::{Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl, SelectableHelper};

use crate::database::models::{NewUser, User};
use crate::database::{balance, idgen};
use crate::errors::{LedgerError, Result};

// creates the user together with its zero balance, both or neither
pub fn register(conn: &mut PgConnection, req_username: &str, req_password_hash: &str) -> Result<i64> {
    conn.transaction::<_, LedgerError, _>(|conn| {
        let new_id = idgen::next();
        let inserted = {
            use crate::schema::users::dsl::*;
            diesel::insert_into(users)
                .values(&NewUser {
                    id: new_id,
                    username: req_username,
                    password_hash: req_password_hash,
                    created_at: chrono::Utc::now(),
                })
                .on_conflict(username)
                .do_nothing()
                .execute(conn)?
        };
        if inserted == 0 {
            return Err(LedgerError::UserExists);
        }
        balance::create_for_user(conn, new_id)?;
        Ok(new_id)
    })
}

pub fn find_by_username(conn: &mut PgConnection, req_username: &str) -> Result<Option<User>> {
    use crate::schema::users::dsl::*;
    let user = users
        .filter(username.eq(req_username))
        .select(User::as_select())
        .first(conn)
        .optional()?;
    Ok(user)
}
