extern crate std;

use soroban_sdk::{
    testutils::{Address as _, Ledger as _},
    token, Address, Env, String,
};

use crate::invariants::{
    assert_all_project_invariants, assert_contribution_applied, assert_project_immutable_fields,
    assert_sequential_ids, assert_valid_status_transition,
};
use crate::{Error, ProjectStatus, SciFund, SciFundClient};

struct Setup<'a> {
    env: Env,
    client: SciFundClient<'a>,
    token: token::Client<'a>,
    token_admin: token::StellarAssetClient<'a>,
    researcher: Address,
}

fn setup<'a>() -> Setup<'a> {
    let env = Env::default();
    env.mock_all_auths();
    let contract_id = env.register(SciFund, ());
    let client = SciFundClient::new(&env, &contract_id);

    let admin = Address::generate(&env);
    let sac = env.register_stellar_asset_contract_v2(admin);
    let token = token::Client::new(&env, &sac.address());
    let token_admin = token::StellarAssetClient::new(&env, &sac.address());
    let researcher = Address::generate(&env);

    Setup {
        env,
        client,
        token,
        token_admin,
        researcher,
    }
}

fn text(env: &Env, s: &str) -> String {
    String::from_str(env, s)
}

fn create_project(s: &Setup, goal: i128) -> u64 {
    s.client.create_project(
        &s.researcher,
        &s.token.address,
        &text(&s.env, "Test Research Project"),
        &text(&s.env, "A test project for scientific research"),
        &goal,
        &30,
        &text(&s.env, "QmTest123"),
    )
}

fn funder_with(s: &Setup, balance: i128) -> Address {
    let funder = Address::generate(&s.env);
    s.token_admin.mint(&funder, &balance);
    funder
}

#[test]
fn test_create_project() {
    let s = setup();
    let id = create_project(&s, 1_000);
    assert_eq!(id, 1);

    let project = s.client.get_project(&id);
    assert_eq!(project.researcher, s.researcher);
    assert_eq!(project.title, text(&s.env, "Test Research Project"));
    assert_eq!(project.funding_goal, 1_000);
    assert_eq!(project.current_funding, 0);
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(project.deadline, s.env.ledger().timestamp() + 30 * 86_400);
    assert_all_project_invariants(&project);
}

#[test]
fn test_project_ids_are_sequential() {
    let s = setup();
    let ids: std::vec::Vec<u64> = (0..3).map(|_| create_project(&s, 100)).collect();
    let projects: std::vec::Vec<_> = ids.iter().map(|id| s.client.get_project(id)).collect();
    assert_sequential_ids(&projects);
    assert_eq!(s.client.project_count(), 3);
}

#[test]
fn test_create_project_rejects_zero_goal() {
    let s = setup();
    let result = s.client.try_create_project(
        &s.researcher,
        &s.token.address,
        &text(&s.env, "Test Project"),
        &text(&s.env, "Description"),
        &0,
        &30,
        &text(&s.env, "QmTest123"),
    );
    assert_eq!(result, Err(Ok(Error::InvalidFundingGoal)));
}

#[test]
fn test_create_project_rejects_zero_duration() {
    let s = setup();
    let result = s.client.try_create_project(
        &s.researcher,
        &s.token.address,
        &text(&s.env, "Test Project"),
        &text(&s.env, "Description"),
        &100,
        &0,
        &text(&s.env, "QmTest123"),
    );
    assert_eq!(result, Err(Ok(Error::InvalidDuration)));
}

#[test]
fn test_get_missing_project() {
    let s = setup();
    assert_eq!(s.client.try_get_project(&7), Err(Ok(Error::ProjectNotFound)));
}

#[test]
fn test_partial_funding_stays_active() {
    let s = setup();
    let id = create_project(&s, 1_000);
    let funder = funder_with(&s, 1_000);

    s.client.fund_project(&id, &funder, &500);

    let project = s.client.get_project(&id);
    assert_eq!(project.current_funding, 500);
    assert_eq!(project.escrow, 500);
    assert_eq!(project.status, ProjectStatus::Active);
    assert_eq!(s.token.balance(&funder), 500);
    assert_eq!(s.token.balance(&s.client.address), 500);
    assert_eq!(s.client.get_contribution(&id, &funder), 500);
}

#[test]
fn test_reaching_goal_marks_funded() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);

    s.client.fund_project(&id, &funder, &60);
    let before = s.client.get_project(&id);
    assert_eq!(before.status, ProjectStatus::Active);

    s.client.fund_project(&id, &funder, &40);
    let after = s.client.get_project(&id);
    assert_contribution_applied(before.current_funding, after.current_funding, 40);
    assert_valid_status_transition(before.status, after.status);
    assert_eq!(after.status, ProjectStatus::Funded);
    assert_eq!(after.current_funding, 100);
    assert_project_immutable_fields(&before, &after);
    assert_all_project_invariants(&after);
}

#[test]
fn test_overfunding_in_single_contribution() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 250);

    s.client.fund_project(&id, &funder, &250);

    let project = s.client.get_project(&id);
    assert_eq!(project.current_funding, 250);
    assert_eq!(project.status, ProjectStatus::Funded);
}

#[test]
fn test_funded_project_refuses_contributions() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 200);
    s.client.fund_project(&id, &funder, &100);

    let result = s.client.try_fund_project(&id, &funder, &10);
    assert_eq!(result, Err(Ok(Error::ProjectNotActive)));
    assert_eq!(s.client.get_project(&id).current_funding, 100);
    assert_eq!(s.token.balance(&funder), 100);
}

#[test]
fn test_fund_rejects_non_positive_amount() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    assert_eq!(
        s.client.try_fund_project(&id, &funder, &0),
        Err(Ok(Error::InvalidAmount))
    );
}

#[test]
fn test_fund_missing_project() {
    let s = setup();
    let funder = funder_with(&s, 100);
    assert_eq!(
        s.client.try_fund_project(&42, &funder, &10),
        Err(Ok(Error::ProjectNotFound))
    );
}

#[test]
fn test_fund_after_deadline() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    let deadline = s.client.get_project(&id).deadline;

    s.env.ledger().with_mut(|li| li.timestamp = deadline + 1);

    assert_eq!(
        s.client.try_fund_project(&id, &funder, &10),
        Err(Ok(Error::DeadlinePassed))
    );
}

#[test]
fn test_mint_research_output() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    s.client.fund_project(&id, &funder, &100);

    let token_id = s.client.mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Research Result"),
        &text(&s.env, "QmResult123"),
    );
    assert_eq!(token_id, 1);

    let output = s.client.get_research_output(&token_id);
    assert_eq!(output.project_id, id);
    assert_eq!(output.title, text(&s.env, "Research Result"));
    assert_eq!(output.content_hash, text(&s.env, "QmResult123"));
    assert!(!output.rewards_distributed);

    let project = s.client.get_project(&id);
    assert_eq!(project.status, ProjectStatus::Completed);
    assert_valid_status_transition(ProjectStatus::Funded, project.status);
}

#[test]
fn test_non_researcher_cannot_mint() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    s.client.fund_project(&id, &funder, &100);

    let result = s.client.try_mint_research_output(
        &id,
        &funder,
        &text(&s.env, "Research Result"),
        &text(&s.env, "QmResult123"),
    );
    assert_eq!(result, Err(Ok(Error::NotResearcher)));
    assert_eq!(s.client.get_project(&id).status, ProjectStatus::Funded);
}

#[test]
fn test_cannot_mint_before_funded() {
    let s = setup();
    let id = create_project(&s, 100);

    let result = s.client.try_mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Early"),
        &text(&s.env, "QmEarly"),
    );
    assert_eq!(result, Err(Ok(Error::ProjectNotFunded)));
}

#[test]
fn test_completed_project_cannot_mint_again() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    s.client.fund_project(&id, &funder, &100);
    s.client.mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Result"),
        &text(&s.env, "QmResult"),
    );

    let result = s.client.try_mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Again"),
        &text(&s.env, "QmAgain"),
    );
    assert_eq!(result, Err(Ok(Error::ProjectNotFunded)));
}

#[test]
fn test_withdraw_funds() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 150);
    s.client.fund_project(&id, &funder, &150);

    let withdrawn = s.client.withdraw_funds(&id, &s.researcher);
    assert_eq!(withdrawn, 150);
    assert_eq!(s.token.balance(&s.researcher), 150);

    let project = s.client.get_project(&id);
    assert_eq!(project.escrow, 0);
    assert_eq!(project.current_funding, 150);
    assert_all_project_invariants(&project);

    assert_eq!(
        s.client.try_withdraw_funds(&id, &s.researcher),
        Err(Ok(Error::NothingToWithdraw))
    );
}

#[test]
fn test_withdraw_requires_funded() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 50);
    s.client.fund_project(&id, &funder, &50);

    assert_eq!(
        s.client.try_withdraw_funds(&id, &s.researcher),
        Err(Ok(Error::ProjectNotFunded))
    );
    assert_eq!(
        s.client.try_withdraw_funds(&id, &funder),
        Err(Ok(Error::NotResearcher))
    );
}

#[test]
fn test_distribute_rewards_pro_rata() {
    let s = setup();
    let id = create_project(&s, 100);
    let alice = funder_with(&s, 75);
    let bob = funder_with(&s, 25);
    s.client.fund_project(&id, &alice, &75);
    s.client.fund_project(&id, &bob, &25);

    let token_id = s.client.mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Result"),
        &text(&s.env, "QmResult"),
    );

    s.token_admin.mint(&s.researcher, &1_000);
    s.client.distribute_rewards(&token_id, &s.researcher, &1_000);

    assert_eq!(s.token.balance(&alice), 750);
    assert_eq!(s.token.balance(&bob), 250);
    assert_eq!(s.token.balance(&s.researcher), 0);
    assert!(s.client.get_research_output(&token_id).rewards_distributed);
}

#[test]
fn test_distribute_rewards_only_once() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    s.client.fund_project(&id, &funder, &100);
    let token_id = s.client.mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Result"),
        &text(&s.env, "QmResult"),
    );
    s.token_admin.mint(&s.researcher, &200);

    s.client.distribute_rewards(&token_id, &s.researcher, &100);
    let result = s.client.try_distribute_rewards(&token_id, &s.researcher, &100);
    assert_eq!(result, Err(Ok(Error::RewardsAlreadyDistributed)));
    assert_eq!(s.token.balance(&s.researcher), 100);
}

#[test]
fn test_distribute_rewards_guards() {
    let s = setup();
    let id = create_project(&s, 100);
    let funder = funder_with(&s, 100);
    s.client.fund_project(&id, &funder, &100);
    let token_id = s.client.mint_research_output(
        &id,
        &s.researcher,
        &text(&s.env, "Result"),
        &text(&s.env, "QmResult"),
    );

    assert_eq!(
        s.client.try_distribute_rewards(&99, &s.researcher, &10),
        Err(Ok(Error::OutputNotFound))
    );
    assert_eq!(
        s.client.try_distribute_rewards(&token_id, &funder, &10),
        Err(Ok(Error::NotResearcher))
    );
    assert_eq!(
        s.client.try_distribute_rewards(&token_id, &s.researcher, &0),
        Err(Ok(Error::InvalidAmount))
    );
}
