//! User-facing strings for the poll creation dialogue.

pub const NEW_POLL: &str = "Let's create a new poll. First, send me the title.";
pub const PREMATURE_DONE: &str = "Sorry, a poll needs to have at least one option to work.";
pub const NEXT_OPTION: &str = "Good. Now send me another answer option, or /done to finish.";
pub const HELP: &str = "This bot will help you create polls. Use /start to create a poll here, \
then publish it to groups or send it to individual friends.\n\n\
Send /polls to manage your existing polls.";
pub const PRESS_FAILED: &str = "Sorry, something went wrong";
pub const CREATE_NEW_POLL: &str = "Create new poll";

pub fn first_option(title: &str) -> String {
    format!("New poll: '{title}'\n\nPlease send me the first answer option.")
}

pub fn done(bot_username: &str) -> String {
    format!(
        "\u{1f44d} Poll created. You can now publish it to a group or send it to \
your friends in a private message. To do this, tap the button below or start \
your message in any other chat with @{bot_username} and select one of your polls to send."
    )
}
