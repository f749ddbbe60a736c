//! Operator queries over the recovery index.

use std::io::Write;

use broker_core::{RecoverStatus, State};
use broker_state::{Collected, Dao, StateResult};

/// Jobs in `state`, optionally restricted to one owning instance.
pub fn query(dao: &Dao, state: State, instance: Option<&str>) -> StateResult<Collected<RecoverStatus>> {
    let Some(instance_id) = instance else {
        return dao.find_by_state(state);
    };
    let found = dao.find_by_owner_and_state(instance_id, state)?;
    Ok(Collected {
        items: found
            .items
            .into_iter()
            .map(|js| RecoverStatus {
                instance_id: instance_id.to_string(),
                state: js,
            })
            .collect(),
        errors: found.errors,
    })
}

/// One JSON object per line, sorted by token.
pub fn write_json_lines(out: &mut impl Write, jobs: &mut [RecoverStatus]) -> anyhow::Result<()> {
    jobs.sort_by(|a, b| a.state.token.cmp(&b.state.token));
    for job in jobs.iter() {
        serde_json::to_writer(&mut *out, job)?;
        writeln!(out)?;
    }
    Ok(())
}
