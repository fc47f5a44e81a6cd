use crate::error::ChannelError;

/// Suffix marking a bridge JID as belonging to the Discord channel.
pub const JID_SUFFIX: &str = "@discord";

/// Build the bridge JID for a Discord channel id.
pub fn to_jid(channel_id: &str) -> String {
    format!("{}{}", channel_id, JID_SUFFIX)
}

/// Strip the Discord suffix, returning the native channel id.
pub fn to_channel_id(jid: &str) -> Result<&str, ChannelError> {
    jid.strip_suffix(JID_SUFFIX)
        .ok_or_else(|| ChannelError::NotOwned {
            jid: jid.to_string(),
        })
}

pub fn owns_jid(jid: &str) -> bool {
    jid.ends_with(JID_SUFFIX)
}
