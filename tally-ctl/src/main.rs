use anyhow::Context;
use tally_api::{AuthToken, NewUser, UserId, Uuid};

#[derive(structopt::StructOpt)]
struct Opt {
    /// Base URL of the tally server, e.g. http://localhost:3000
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user
    CreateUser {
        /// Username
        name: String,

        /// Initial password
        password: String,

        /// Contact email
        #[structopt(long)]
        email: Option<String>,

        /// Contact phone number
        #[structopt(long)]
        phone: Option<String>,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let token =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let token = Uuid::try_parse(&token).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(token))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = <Opt as structopt::StructOpt>::from_args();

    let client = reqwest::Client::new();

    match opt.cmd {
        Command::CreateUser {
            name,
            password,
            email,
            phone,
        } => {
            let mut user = NewUser::new(UserId(Uuid::new_v4()), name, password);
            user.email = email;
            user.phone = phone;
            client
                .post(format!("{}/api/admin/create-user", opt.host))
                .json(&user)
                .bearer_auth(admin_token()?.0)
                .send()
                .await?
                .error_for_status()?;
        }
    }

    Ok(())
}
