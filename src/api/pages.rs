//! Buffered HTML rendering. Every page is built into a `String` before
//! any byte reaches the socket, so a render can never fail half-written.
//! All interpolated values go through [`escape`].

use chrono::{DateTime, Utc};

use crate::auth::User;
use crate::store::EventRecord;

/// Page renderer, parameterized on the instance name.
#[derive(Clone, Debug)]
pub struct Pages {
    app_name: String,
}

fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn flash(message: Option<&str>) -> String {
    message.map_or_else(String::new, |m| {
        format!("<p class=\"flash\">{}</p>\n", escape(m))
    })
}

fn csrf_field(csrf: Option<&str>) -> String {
    csrf.map_or_else(String::new, |token| {
        format!(
            "<input type=\"hidden\" name=\"csrf\" value=\"{}\">\n",
            escape(token)
        )
    })
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl Pages {
    #[must_use]
    pub fn new(app_name: &str) -> Self {
        Self {
            app_name: app_name.to_string(),
        }
    }

    fn layout(&self, title: &str, body: &str) -> String {
        format!(
            "<!DOCTYPE html>\n\
             <html lang=\"en\">\n\
             <head>\n\
             <meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <title>{title} - {app}</title>\n\
             </head>\n\
             <body>\n\
             <main>\n\
             {body}\
             </main>\n\
             </body>\n\
             </html>\n",
            title = escape(title),
            app = escape(&self.app_name),
        )
    }

    #[must_use]
    pub fn login(
        &self,
        message: Option<&str>,
        username: &str,
        redirect: &str,
        csrf: Option<&str>,
    ) -> String {
        let mut body = String::from("<h1>Sign in</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/login\">\n");
        body.push_str(&csrf_field(csrf));
        if !redirect.is_empty() {
            body.push_str(&format!(
                "<input type=\"hidden\" name=\"r\" value=\"{}\">\n",
                escape(redirect)
            ));
        }
        body.push_str(&format!(
            "<label>Username <input type=\"text\" name=\"username\" value=\"{}\"></label>\n",
            escape(username)
        ));
        body.push_str("<label>Password <input type=\"password\" name=\"password\"></label>\n");
        body.push_str(
            "<label><input type=\"checkbox\" name=\"remember\" value=\"on\"> Remember me</label>\n",
        );
        body.push_str("<button type=\"submit\">Sign in</button>\n</form>\n");
        body.push_str(
            "<p><a href=\"/register\">Register</a> | <a href=\"/forgot\">Forgot?</a> | \
             <a href=\"/confirm_request\">Resend confirmation</a></p>\n",
        );
        self.layout("Sign in", &body)
    }

    #[must_use]
    pub fn logout(&self) -> String {
        let body = "<h1>Signed out</h1>\n\
                    <p>You have been signed out.</p>\n\
                    <p><a href=\"/login\">Sign in again</a></p>\n";
        self.layout("Signed out", body)
    }

    #[must_use]
    pub fn register(
        &self,
        message: Option<&str>,
        username: &str,
        full_name: &str,
        email: &str,
        csrf: Option<&str>,
    ) -> String {
        let mut body = String::from("<h1>Register</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/register\">\n");
        body.push_str(&csrf_field(csrf));
        body.push_str(&format!(
            "<label>Username <input type=\"text\" name=\"username\" maxlength=\"30\" value=\"{}\"></label>\n",
            escape(username)
        ));
        body.push_str(&format!(
            "<label>Full name <input type=\"text\" name=\"fullName\" value=\"{}\"></label>\n",
            escape(full_name)
        ));
        body.push_str(&format!(
            "<label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\n",
            escape(email)
        ));
        body.push_str("<label>Password <input type=\"password\" name=\"password1\"></label>\n");
        body.push_str(
            "<label>Repeat password <input type=\"password\" name=\"password2\"></label>\n",
        );
        body.push_str("<button type=\"submit\">Register</button>\n</form>\n");
        body.push_str("<p><a href=\"/login\">Already registered? Sign in</a></p>\n");
        self.layout("Register", &body)
    }

    #[must_use]
    pub fn confirm(&self, message: Option<&str>, ctoken: &str, csrf: Option<&str>) -> String {
        let mut body = String::from("<h1>Confirm your account</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/confirm\">\n");
        body.push_str(&csrf_field(csrf));
        body.push_str(&format!(
            "<label>Token <input type=\"text\" name=\"ctoken\" value=\"{}\"></label>\n",
            escape(ctoken)
        ));
        body.push_str("<button type=\"submit\">Confirm</button>\n</form>\n");
        body.push_str("<p><a href=\"/confirm_request\">Need a new token?</a></p>\n");
        self.layout("Confirm", &body)
    }

    #[must_use]
    pub fn confirm_request(&self, message: Option<&str>, email: &str, csrf: Option<&str>) -> String {
        let mut body = String::from("<h1>Resend confirmation</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/confirm_request\">\n");
        body.push_str(&csrf_field(csrf));
        body.push_str(&format!(
            "<label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\n",
            escape(email)
        ));
        body.push_str("<button type=\"submit\">Send link</button>\n</form>\n");
        self.layout("Resend confirmation", &body)
    }

    #[must_use]
    pub fn confirm_request_sent(&self) -> String {
        let body = "<h1>Check your inbox</h1>\n\
                    <p>If the address is registered, a confirmation link is on its way.</p>\n\
                    <p><a href=\"/confirm\">Enter the token</a></p>\n";
        self.layout("Check your inbox", body)
    }

    #[must_use]
    pub fn confirmed(&self) -> String {
        let body = "<h1>Account confirmed</h1>\n\
                    <p>Your account is confirmed.</p>\n\
                    <p><a href=\"/login\">Sign in</a></p>\n";
        self.layout("Account confirmed", body)
    }

    #[must_use]
    pub fn forgot(&self, message: Option<&str>, email: &str, csrf: Option<&str>) -> String {
        let mut body = String::from("<h1>Recover access</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/forgot\">\n");
        body.push_str(&csrf_field(csrf));
        body.push_str(&format!(
            "<label>Email <input type=\"email\" name=\"email\" value=\"{}\"></label>\n",
            escape(email)
        ));
        body.push_str(
            "<label><input type=\"radio\" name=\"action\" value=\"user\"> Send my username</label>\n",
        );
        body.push_str(
            "<label><input type=\"radio\" name=\"action\" value=\"password\" checked> Reset my password</label>\n",
        );
        body.push_str("<button type=\"submit\">Send</button>\n</form>\n");
        self.layout("Recover access", &body)
    }

    #[must_use]
    pub fn forgot_sent(&self) -> String {
        let body = "<h1>Check your inbox</h1>\n\
                    <p>If the address is registered, an email is on its way.</p>\n\
                    <p><a href=\"/login\">Back to sign in</a></p>\n";
        self.layout("Check your inbox", body)
    }

    #[must_use]
    pub fn reset(&self, message: Option<&str>, rtoken: &str, csrf: Option<&str>) -> String {
        let mut body = String::from("<h1>Reset password</h1>\n");
        body.push_str(&flash(message));
        body.push_str("<form method=\"post\" action=\"/reset\">\n");
        body.push_str(&csrf_field(csrf));
        body.push_str(&format!(
            "<label>Token <input type=\"text\" name=\"rtoken\" value=\"{}\"></label>\n",
            escape(rtoken)
        ));
        body.push_str("<label>New password <input type=\"password\" name=\"password1\"></label>\n");
        body.push_str(
            "<label>Repeat password <input type=\"password\" name=\"password2\"></label>\n",
        );
        body.push_str("<button type=\"submit\">Reset</button>\n</form>\n");
        self.layout("Reset password", &body)
    }

    #[must_use]
    pub fn user(&self, user: &User) -> String {
        let mut body = format!("<h1>{}</h1>\n<dl>\n", escape(&user.username));
        body.push_str(&format!(
            "<dt>Full name</dt><dd>{}</dd>\n",
            escape(&user.full_name)
        ));
        body.push_str(&format!("<dt>Email</dt><dd>{}</dd>\n", escape(&user.email)));
        body.push_str(&format!(
            "<dt>Confirmed</dt><dd>{}</dd>\n",
            if user.confirmed { "yes" } else { "no" }
        ));
        body.push_str(&format!("<dt>Member since</dt><dd>{}</dd>\n", stamp(user.created)));
        match &user.last_login {
            Some(last) => body.push_str(&format!(
                "<dt>Last login</dt><dd>{} ({})</dd>\n",
                stamp(last.at),
                escape(&last.message)
            )),
            None => body.push_str("<dt>Last login</dt><dd>First login</dd>\n"),
        }
        body.push_str("</dl>\n<p><a href=\"/logout\">Sign out</a></p>\n");
        self.layout("Your account", &body)
    }

    #[must_use]
    pub fn users(&self, users: &[User]) -> String {
        let mut body = String::from(
            "<h1>Users</h1>\n<table>\n\
             <tr><th>Username</th><th>Full name</th><th>Email</th>\
             <th>Admin</th><th>Confirmed</th><th>Created</th></tr>\n",
        );
        for user in users {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&user.username),
                escape(&user.full_name),
                escape(&user.email),
                if user.admin { "yes" } else { "no" },
                if user.confirmed { "yes" } else { "no" },
                stamp(user.created),
            ));
        }
        body.push_str("</table>\n");
        self.layout("Users", &body)
    }

    #[must_use]
    pub fn events(&self, events: &[EventRecord]) -> String {
        let mut body = String::from(
            "<h1>Events</h1>\n<table>\n\
             <tr><th>When</th><th>Event</th><th>Result</th><th>Username</th><th>Message</th></tr>\n",
        );
        for event in events {
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                stamp(event.created),
                escape(&event.name),
                if event.succeeded { "ok" } else { "failed" },
                escape(&event.username),
                escape(&event.message),
            ));
        }
        body.push_str("</table>\n");
        self.layout("Events", &body)
    }

    #[must_use]
    pub fn home(&self, user: Option<&User>) -> String {
        let mut body = format!("<h1>{}</h1>\n", escape(&self.app_name));
        match user {
            Some(user) => {
                body.push_str(&format!(
                    "<p>Signed in as {}.</p>\n",
                    escape(&user.username)
                ));
                body.push_str(
                    "<p><a href=\"/user\">Your account</a> | <a href=\"/logout\">Sign out</a></p>\n",
                );
            }
            None => {
                body.push_str("<p>Welcome.</p>\n");
                body.push_str(
                    "<p><a href=\"/login\">Sign in</a> | <a href=\"/register\">Register</a></p>\n",
                );
            }
        }
        self.layout("Home", &body)
    }

    #[must_use]
    pub fn forbidden(&self) -> String {
        let body = "<h1>Forbidden</h1>\n\
                    <p>You do not have access to this page.</p>\n\
                    <p><a href=\"/\">Home</a></p>\n";
        self.layout("Forbidden", body)
    }

    #[must_use]
    pub fn internal_error(&self) -> String {
        let body = "<h1>Something went wrong</h1>\n\
                    <p>Please try again later.</p>\n\
                    <p><a href=\"/\">Home</a></p>\n";
        self.layout("Error", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LastLogin;

    fn pages() -> Pages {
        Pages::new("entrata")
    }

    fn sample_user() -> User {
        User {
            username: "jdoe".to_string(),
            full_name: "Jane Doe".to_string(),
            email: "j@example.com".to_string(),
            admin: false,
            confirmed: true,
            created: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn every_page_is_a_complete_document() {
        let user = sample_user();
        let rendered = [
            pages().login(None, "", "", None),
            pages().logout(),
            pages().register(None, "", "", "", None),
            pages().confirm(None, "", None),
            pages().confirm_request(None, "", None),
            pages().confirm_request_sent(),
            pages().confirmed(),
            pages().forgot(None, "", None),
            pages().forgot_sent(),
            pages().reset(None, "", None),
            pages().user(&user),
            pages().users(&[user.clone()]),
            pages().events(&[]),
            pages().home(Some(&user)),
            pages().forbidden(),
            pages().internal_error(),
        ];
        for page in rendered {
            assert!(page.starts_with("<!DOCTYPE html>"));
            assert!(page.ends_with("</html>\n"));
            assert!(page.contains("entrata"));
        }
    }

    #[test]
    fn interpolated_values_are_escaped() {
        let page = pages().login(
            Some("<script>alert(1)</script>"),
            "\"><img src=x>",
            "",
            None,
        );
        assert!(!page.contains("<script>alert"));
        assert!(page.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(page.contains("&quot;&gt;&lt;img src=x&gt;"));
    }

    #[test]
    fn login_page_has_the_form_fields() {
        let page = pages().login(None, "jdoe", "/home", None);
        assert!(page.contains("name=\"username\""));
        assert!(page.contains("value=\"jdoe\""));
        assert!(page.contains("name=\"password\""));
        assert!(page.contains("name=\"remember\""));
        assert!(page.contains("name=\"r\" value=\"/home\""));
    }

    #[test]
    fn login_page_omits_redirect_field_when_empty() {
        let page = pages().login(None, "", "", None);
        assert!(!page.contains("name=\"r\""));
    }

    #[test]
    fn csrf_field_only_renders_when_present() {
        let with = pages().register(None, "", "", "", Some("token123"));
        let without = pages().register(None, "", "", "", None);
        assert!(with.contains("name=\"csrf\" value=\"token123\""));
        assert!(!without.contains("name=\"csrf\""));
    }

    #[test]
    fn register_page_uses_the_wire_field_names() {
        let page = pages().register(None, "jdoe", "Jane Doe", "j@example.com", None);
        assert!(page.contains("name=\"fullName\" value=\"Jane Doe\""));
        assert!(page.contains("name=\"password1\""));
        assert!(page.contains("name=\"password2\""));
    }

    #[test]
    fn confirm_and_reset_prefill_tokens() {
        let confirm = pages().confirm(None, "CTOKEN", None);
        let reset = pages().reset(None, "RTOKEN", None);
        assert!(confirm.contains("name=\"ctoken\" value=\"CTOKEN\""));
        assert!(reset.contains("name=\"rtoken\" value=\"RTOKEN\""));
    }

    #[test]
    fn forgot_page_offers_both_actions() {
        let page = pages().forgot(None, "", None);
        assert!(page.contains("name=\"action\" value=\"user\""));
        assert!(page.contains("name=\"action\" value=\"password\""));
    }

    #[test]
    fn user_page_shows_last_login_or_first_login() {
        let mut user = sample_user();
        assert!(pages().user(&user).contains("First login"));

        user.last_login = Some(LastLogin {
            at: Utc::now(),
            message: "login from 203.0.113.7".to_string(),
        });
        assert!(pages().user(&user).contains("login from 203.0.113.7"));
    }

    #[test]
    fn events_page_lists_rows() {
        let events = vec![EventRecord {
            name: "login".to_string(),
            succeeded: false,
            username: "jdoe".to_string(),
            message: "invalid credentials".to_string(),
            created: Utc::now(),
        }];
        let page = pages().events(&events);
        assert!(page.contains("<td>login</td>"));
        assert!(page.contains("<td>failed</td>"));
        assert!(page.contains("<td>invalid credentials</td>"));
    }

    #[test]
    fn home_page_is_session_aware() {
        let user = sample_user();
        let signed_in = pages().home(Some(&user));
        let anonymous = pages().home(None);
        assert!(signed_in.contains("Signed in as jdoe."));
        assert!(anonymous.contains("href=\"/login\""));
        assert!(!anonymous.contains("Signed in as"));
    }
}
