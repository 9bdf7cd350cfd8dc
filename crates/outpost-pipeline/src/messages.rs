//! User-visible message and embed composition.

use outpost_platform::{Embed, EmbedField};

pub fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

pub fn recruitment_welcome(user_id: &str) -> String {
    format!(
        "Welcome {}!\n\n\
         A member of the recruitment team will be with you shortly. \
         In the meantime, please register your characters on the auth portal, \
         link your chat account under Services, and authorize each character. \
         A green tick next to your name here means it worked.",
        mention(user_id)
    )
}

pub fn member_join_welcome(display_name: &str, user_id: &str) -> String {
    format!(
        "Welcome to the corporation, {} {}! o7\n\n\
         Have a look at the guides channel to get your bearings, and visit the \
         ping-roles channel to opt out of the content pings that do not \
         interest you.\n\nClear skies!",
        display_name,
        mention(user_id)
    )
}

pub fn landing_welcome(user_id: &str) -> String {
    format!(
        "{} just landed. Say hello, and head to the recruitment channel if \
         you are looking to join.",
        mention(user_id)
    )
}

pub fn leaver_notice(display_name: &str) -> String {
    format!("{display_name} has left the server.")
}

pub fn hr_departure_notice(display_name: &str) -> String {
    format!("{display_name} has left the corporation and was moved back to guest.")
}

pub fn authentication_complete(display_name: &str) -> String {
    format!("{display_name} has completed the authentication steps.")
}

pub const AUTHENTICATION_DM: &str = "Your authentication steps are complete. \
     Please reach out to a recruiter in the recruitment channel.";

pub fn reminder_authenticated(user_id: &str) -> String {
    format!(
        "{} It looks like you have completed the authentication steps. If you \
         are still interested in joining the corporation, please reach out to \
         a recruiter in the recruitment channel.",
        mention(user_id)
    )
}

pub fn reminder_unauthenticated(user_id: &str) -> String {
    format!(
        "{} Are you still interested in joining the corporation? If so, please \
         complete the authentication steps provided previously and reach out \
         to a recruiter.",
        mention(user_id)
    )
}

pub const CLEANUP_KEPT_MESSAGE: &str =
    "Automated check passed: activity recorded during the recruitment window. Keeping the recruit role.";

pub const CLEANUP_REMOVED_MESSAGE: &str =
    "No activity recorded during the recruitment window. Flagged for removal.";

pub const JOINED_CORPORATION_MESSAGE: &str = "Character Joined Corporation.";

pub fn rejoined_recruitment(display_name: &str) -> String {
    format!("{display_name} Rejoined Recruitment")
}

pub fn left_recruitment(display_name: &str) -> String {
    format!("{display_name} has left the recruitment channel.")
}

pub fn left_server(display_name: &str) -> String {
    format!("{display_name} left the server.")
}

pub fn checkin_scheduled(days: i64) -> String {
    format!("User checkin scheduled for {days} days time.")
}

pub fn authentication_thread_note(display_name: &str) -> String {
    format!("{display_name} Authentication Steps Complete.")
}

/// The first-week activity summary posted by the check-in task.
pub fn checkin_embed(
    display_name: &str,
    messages: i64,
    voice_joins: i64,
    invites: i64,
    top_channel_id: Option<&str>,
) -> Embed {
    Embed {
        title: format!("{display_name}'s First Week Analytics"),
        description: format!(
            "Here's how {display_name} has been engaging with the community in their first week:"
        ),
        color: 0x000000,
        fields: vec![
            EmbedField {
                name: "Messages Sent".into(),
                value: messages.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Voice Joins".into(),
                value: voice_joins.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Invites Created".into(),
                value: invites.to_string(),
                inline: true,
            },
            EmbedField {
                name: "Most Active Channel".into(),
                value: match top_channel_id {
                    Some(id) => format!("<#{id}>"),
                    None => "No channel activity recorded".into(),
                },
                inline: false,
            },
        ],
        footer: "User activity tracker".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkin_embed_carries_all_counters() {
        let embed = checkin_embed("Rook", 12, 3, 1, Some("c-main"));
        assert_eq!(embed.fields.len(), 4);
        assert_eq!(embed.fields[0].value, "12");
        assert_eq!(embed.fields[3].value, "<#c-main>");
    }

    #[test]
    fn checkin_embed_handles_missing_top_channel() {
        let embed = checkin_embed("Rook", 0, 0, 0, None);
        assert_eq!(embed.fields[3].value, "No channel activity recorded");
    }

    #[test]
    fn mentions_use_platform_syntax() {
        assert_eq!(mention("42"), "<@42>");
        assert!(recruitment_welcome("42").contains("<@42>"));
    }
}
