extern crate std;

use soroban_sdk::{
    symbol_short,
    testutils::{Address as _, Events},
    token, vec, Address, Env, IntoVal, String, TryIntoVal,
};

use crate::events::{OutputMinted, ProjectCreated, ProjectFunded, RewardsDistributed, StatusUpdated};
use crate::{ProjectStatus, SciFund, SciFundClient};

fn setup() -> (Env, SciFundClient<'static>) {
    let env = Env::default();
    env.mock_all_auths();
    let contract_id = env.register(SciFund, ());
    let client = SciFundClient::new(&env, &contract_id);
    (env, client)
}

fn create_token<'a>(env: &Env, admin: &Address) -> token::Client<'a> {
    let addr = env.register_stellar_asset_contract_v2(admin.clone());
    token::Client::new(env, &addr.address())
}

fn create_project(env: &Env, client: &SciFundClient, researcher: &Address, token: &Address, goal: i128) -> u64 {
    client.create_project(
        researcher,
        token,
        &String::from_str(env, "Test Project"),
        &String::from_str(env, "Description"),
        &goal,
        &30,
        &String::from_str(env, "QmTest123"),
    )
}

#[test]
fn test_project_created_event() {
    let (env, client) = setup();
    let researcher = Address::generate(&env);
    let token = create_token(&env, &Address::generate(&env));

    let id = create_project(&env, &client, &researcher, &token.address, 5_000);

    let all_events = env.events().all();
    let last_event = all_events.last().expect("No events found");

    assert_eq!(last_event.0, client.address);
    let expected_topics = vec![
        &env,
        symbol_short!("created").into_val(&env),
        id.into_val(&env),
    ];
    assert_eq!(last_event.1, expected_topics);

    let event_data: ProjectCreated = last_event.2.try_into_val(&env).unwrap();
    assert_eq!(
        event_data,
        ProjectCreated {
            project_id: id,
            researcher: researcher.clone(),
            title: String::from_str(&env, "Test Project"),
            funding_goal: 5_000,
        }
    );
}

#[test]
fn test_project_funded_event() {
    let (env, client) = setup();
    let researcher = Address::generate(&env);
    let token_admin = Address::generate(&env);
    let token = create_token(&env, &token_admin);
    let funder = Address::generate(&env);

    let id = create_project(&env, &client, &researcher, &token.address, 10_000);
    token::StellarAssetClient::new(&env, &token.address).mint(&funder, &1_000);

    client.fund_project(&id, &funder, &1_000);

    let all_events = env.events().all();
    let last_event = all_events.last().expect("No events found");

    let expected_topics = vec![
        &env,
        symbol_short!("funded").into_val(&env),
        id.into_val(&env),
    ];
    assert_eq!(last_event.1, expected_topics);

    let event_data: ProjectFunded = last_event.2.try_into_val(&env).unwrap();
    assert_eq!(
        event_data,
        ProjectFunded {
            project_id: id,
            funder: funder.clone(),
            amount: 1_000,
        }
    );
}

#[test]
fn test_status_event_when_goal_reached() {
    let (env, client) = setup();
    let researcher = Address::generate(&env);
    let token = create_token(&env, &Address::generate(&env));
    let funder = Address::generate(&env);

    let id = create_project(&env, &client, &researcher, &token.address, 100);
    token::StellarAssetClient::new(&env, &token.address).mint(&funder, &100);

    client.fund_project(&id, &funder, &100);

    let all_events = env.events().all();
    let last_event = all_events.last().expect("No events found");

    let expected_topics = vec![
        &env,
        symbol_short!("status").into_val(&env),
        id.into_val(&env),
    ];
    assert_eq!(last_event.1, expected_topics);

    let event_data: StatusUpdated = last_event.2.try_into_val(&env).unwrap();
    assert_eq!(
        event_data,
        StatusUpdated {
            project_id: id,
            status: ProjectStatus::Funded,
        }
    );
}

#[test]
fn test_minted_and_rewarded_events() {
    let (env, client) = setup();
    let researcher = Address::generate(&env);
    let token = create_token(&env, &Address::generate(&env));
    let sac = token::StellarAssetClient::new(&env, &token.address);
    let funder = Address::generate(&env);

    let id = create_project(&env, &client, &researcher, &token.address, 100);
    sac.mint(&funder, &100);
    client.fund_project(&id, &funder, &100);

    let content_hash = String::from_str(&env, "QmResult123");
    let token_id = client.mint_research_output(
        &id,
        &researcher,
        &String::from_str(&env, "Research Result"),
        &content_hash,
    );

    let all_events = env.events().all();
    let last_event = all_events.last().expect("No events found");
    let expected_topics = vec![
        &env,
        symbol_short!("minted").into_val(&env),
        id.into_val(&env),
    ];
    assert_eq!(last_event.1, expected_topics);
    let minted: OutputMinted = last_event.2.try_into_val(&env).unwrap();
    assert_eq!(
        minted,
        OutputMinted {
            project_id: id,
            token_id,
            content_hash,
        }
    );

    sac.mint(&researcher, &50);
    client.distribute_rewards(&token_id, &researcher, &50);

    let all_events = env.events().all();
    let last_event = all_events.last().expect("No events found");
    let expected_topics = vec![
        &env,
        symbol_short!("rewarded").into_val(&env),
        id.into_val(&env),
    ];
    assert_eq!(last_event.1, expected_topics);
    let rewarded: RewardsDistributed = last_event.2.try_into_val(&env).unwrap();
    assert_eq!(
        rewarded,
        RewardsDistributed {
            project_id: id,
            token_id,
            researcher: researcher.clone(),
            amount: 50,
        }
    );
}
