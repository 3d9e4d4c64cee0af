//! Commit wire-format properties across every supported group.

use {
    anyhow::{ensure, Result},
    ieee_80211_sae::{
        field::SaeUint,
        frame::{Commit, FrameError},
        group::{find, Element, Group, GroupFamily, GroupId},
    },
};

const GROUP_IDS: [u16; 6] = [19, 20, 21, 22, 23, 24];

fn generator(group: &'static Group) -> Element<'static> {
    match group.family() {
        GroupFamily::Ec => Element::Ec(group.as_ec().expect("family matched").generator()),
        GroupFamily::Ffc => Element::Ffc(group.as_ffc().expect("family matched").generator()),
    }
}

fn sample_commit(group: &'static Group) -> Commit<'static> {
    Commit {
        group,
        token: None,
        scalar: SaeUint::from(5_u64),
        element: generator(group),
        password_id: None,
    }
}

#[test]
fn test_commit_roundtrip_every_group() -> Result<()> {
    for id in GROUP_IDS {
        let group = find(GroupId(id)).expect("registered group");
        let commit = sample_commit(group);
        let body = commit.encode();
        ensure!(
            body.len() == 2 + group.scalar_len() + group.element_len(),
            "group {id}: unexpected commit width"
        );
        let parsed = Commit::parse(group, &body, false)?;
        ensure!(parsed.scalar == commit.scalar, "group {id}: scalar");
        ensure!(parsed.element == commit.element, "group {id}: element");
    }
    Ok(())
}

#[test]
fn test_trivial_scalars_rejected_every_group() -> Result<()> {
    for id in GROUP_IDS {
        let group = find(GroupId(id)).expect("registered group");
        let order = group.scalar_field().modulus();
        for scalar in [
            SaeUint::ZERO,
            SaeUint::from(1_u64),
            order - SaeUint::from(1_u64),
        ] {
            let mut commit = sample_commit(group);
            commit.scalar = scalar;
            ensure!(
                Commit::parse(group, &commit.encode(), false)
                    == Err(FrameError::InvalidScalar),
                "group {id}: scalar {scalar} must be rejected"
            );
        }
    }
    Ok(())
}

#[test]
fn test_out_of_range_element_rejected_every_group() -> Result<()> {
    for id in GROUP_IDS {
        let group = find(GroupId(id)).expect("registered group");
        let commit = sample_commit(group);
        let mut body = commit.encode();
        // Overwrite the element with all-ones coordinates, each >= p.
        let element_at = body.len() - group.element_len();
        for byte in &mut body[element_at..] {
            *byte = 0xff;
        }
        ensure!(
            Commit::parse(group, &body, false) == Err(FrameError::InvalidElement),
            "group {id}: coordinate >= modulus must be rejected"
        );
    }
    Ok(())
}

#[test]
fn test_undersized_commit_rejected_every_group() -> Result<()> {
    for id in GROUP_IDS {
        let group = find(GroupId(id)).expect("registered group");
        let body = sample_commit(group).encode();
        for cut in [3, body.len() - 1] {
            ensure!(
                Commit::parse(group, &body[..cut], false) == Err(FrameError::Truncated),
                "group {id}: undersized body must be rejected"
            );
        }
    }
    Ok(())
}
