use bytes::Bytes;

use super::{to_asciz, AuthContext, AuthPlugin};
use crate::error::{Error, MySqlClientError};

/// Sends the password as-is. Only loaded when `enable_cleartext_plugin` is set.
///
/// <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_authentication_methods_clear_text_password.html>
#[derive(Debug)]
pub(crate) struct ClearPasswordAuthPlugin;

impl AuthPlugin for ClearPasswordAuthPlugin {
    fn name(&self) -> &'static str {
        "mysql_clear_password"
    }

    fn scramble(&self, cx: AuthContext<'_>) -> Result<Vec<u8>, Error> {
        Ok(to_asciz(cx.password))
    }

    fn handle(&self, _data: Bytes, _cx: AuthContext<'_>) -> Result<Option<Vec<u8>>, Error> {
        Err(MySqlClientError::auth_plugin(self.name(), "unexpected extra data from the server").into())
    }
}
