use flick_common::{Session, UserId};

/// A registered user on a given server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Account {
    pub server: String,
    pub session: Session,
}
impl AsRef<Account> for Account {
    fn as_ref(&self) -> &Account {
        self
    }
}
impl Account {
    pub fn user(&self) -> &UserId {
        &self.session.user
    }
    pub fn url(&self, path: &str) -> String {
        self.server.trim_end_matches('/').to_string() + path
    }
}

pub mod client {
    use anyhow::Result;
    use flick_common::{FriendAction, Registration, Session, UserId};
    use reqwest::{Client, RequestBuilder, StatusCode};
    use crate::Account;

    fn authorized(request: RequestBuilder, account: &Account) -> RequestBuilder {
        request.header(reqwest::header::AUTHORIZATION, account.session.token.as_str())
    }

    async fn status_and_body(request: RequestBuilder) -> Result<(StatusCode, String)> {
        let response = request.send().await?;
        let status = response.status();
        Ok((status, response.text().await?))
    }

    pub async fn register(
        client: &Client,
        server: &str,
        id: impl Into<String>,
        registration: &Registration,
    ) -> Result<Account> {
        let id = id.into();
        let session: Session = client
            .post(server.trim_end_matches('/').to_string() + "/add-user/" + &id)
            .json(registration)
            .send()
            .await?
            .error_for_status()?
            .json::<_>()
            .await?;
        Ok(Account { server: server.to_string(), session })
    }
    pub async fn friend_action(
        client: &Client,
        account: impl AsRef<Account>,
        action: FriendAction,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        let account = account.as_ref();
        status_and_body(
            authorized(client.post(account.url(action.path())), account)
                .query(&[("friendId", friend.as_str())]),
        )
        .await
    }
    pub async fn send_friend_request(
        client: &Client,
        account: impl AsRef<Account>,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        friend_action(client, account, FriendAction::Send, friend).await
    }
    pub async fn accept_friend_request(
        client: &Client,
        account: impl AsRef<Account>,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        friend_action(client, account, FriendAction::Accept, friend).await
    }
    pub async fn decline_friend_request(
        client: &Client,
        account: impl AsRef<Account>,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        friend_action(client, account, FriendAction::Decline, friend).await
    }
    pub async fn revoke_friend_request(
        client: &Client,
        account: impl AsRef<Account>,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        friend_action(client, account, FriendAction::Revoke, friend).await
    }
    pub async fn unfriend(
        client: &Client,
        account: impl AsRef<Account>,
        friend: &UserId,
    ) -> Result<(StatusCode, String)> {
        friend_action(client, account, FriendAction::Remove, friend).await
    }
    pub async fn rated_movie(
        client: &Client,
        account: impl AsRef<Account>,
        movie: &str,
    ) -> Result<(StatusCode, String)> {
        let account = account.as_ref();
        let request = authorized(client.post(account.url("/ratedMovie")), account);
        status_and_body(request.query(&[("movieId", movie)])).await
    }
    pub async fn added_token(
        client: &Client,
        account: impl AsRef<Account>,
        token: &str,
    ) -> Result<(StatusCode, String)> {
        let account = account.as_ref();
        let request = authorized(client.post(account.url("/addedToken")), account);
        status_and_body(request.query(&[("token", token)])).await
    }
    async fn get_ids(client: &Client, account: &Account, path: &str) -> Result<Vec<UserId>> {
        Ok(authorized(client.get(account.url(path)), account)
            .send()
            .await?
            .error_for_status()?
            .json::<_>()
            .await?)
    }
    pub async fn get_friends(client: &Client, account: impl AsRef<Account>) -> Result<Vec<UserId>> {
        get_ids(client, account.as_ref(), "/friends").await
    }
    pub async fn rec_friend_requests(
        client: &Client,
        account: impl AsRef<Account>,
    ) -> Result<Vec<UserId>> {
        get_ids(client, account.as_ref(), "/requests/incoming").await
    }
    pub async fn sent_friend_requests(
        client: &Client,
        account: impl AsRef<Account>,
    ) -> Result<Vec<UserId>> {
        get_ids(client, account.as_ref(), "/requests/outgoing").await
    }
}
