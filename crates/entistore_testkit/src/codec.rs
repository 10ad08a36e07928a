//! JSON entity codec for the test domain.
//!
//! Each entity type gets its own payload shape. References to other
//! entities are written as identities and restored in `relink`; employment
//! edges travel with the human side only, so each edge is rebuilt exactly
//! once.

use crate::fixtures::{ContactInformation, Department, Employment, Human, Id, Organization, Team};
use entistore_core::{CoreError, CoreResult, EntityCodec, ObjectRef, Resolver};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct ContactPayload {
    email: String,
    phone: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmploymentPayload {
    title: String,
    employer: Id,
}

#[derive(Debug, Serialize, Deserialize)]
struct HumanPayload {
    name: String,
    first_name: String,
    nick_name: String,
    last_name: String,
    #[serde(default)]
    employments: Vec<EmploymentPayload>,
    #[serde(default)]
    children: Vec<Id>,
    #[serde(default)]
    parents: Vec<Id>,
    contact_information: Option<ContactPayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OrganizationPayload {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DepartmentPayload {
    name: String,
    #[serde(default)]
    teams: Vec<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TeamPayload {
    name: String,
    department: Option<Id>,
}

/// Encodes the test domain as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

fn to_json<T: Serialize>(payload: &T) -> CoreResult<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| CoreError::codec(e.to_string()))
}

fn from_json<'a, T: Deserialize<'a>>(payload: &'a [u8]) -> CoreResult<T> {
    serde_json::from_slice(payload).map_err(|e| CoreError::codec(e.to_string()))
}

fn ids(refs: &[ObjectRef], identify: &dyn Fn(&ObjectRef) -> Option<Id>) -> Vec<Id> {
    refs.iter().filter_map(|r| identify(r)).collect()
}

fn unresolved(type_name: &str, id: Id) -> CoreError {
    CoreError::codec(format!("dangling reference to {type_name} {id}"))
}

fn resolve(resolver: Resolver<'_, Id>, type_name: &str, id: Id) -> CoreResult<ObjectRef> {
    resolver(type_name, &id).ok_or_else(|| unresolved(type_name, id))
}

impl EntityCodec<Id> for JsonCodec {
    fn encode(
        &self,
        entity: &ObjectRef,
        identify: &dyn Fn(&ObjectRef) -> Option<Id>,
    ) -> CoreResult<Vec<u8>> {
        if let Some(human) = entity.downcast_ref::<Human>() {
            let employments = human
                .employments()
                .iter()
                .filter_map(|node| {
                    let node = Employment::of(node);
                    let employer = identify(&node.employer()?)?;
                    Some(EmploymentPayload {
                        title: node.title().to_string(),
                        employer,
                    })
                })
                .collect();
            let contact_information = human.contact_information().and_then(|info| {
                info.downcast_ref::<ContactInformation>().map(|c| ContactPayload {
                    email: c.email.clone(),
                    phone: c.phone.clone(),
                })
            });
            return to_json(&HumanPayload {
                name: human.name(),
                first_name: human.first_name(),
                nick_name: human.nick_name(),
                last_name: human.last_name(),
                employments,
                children: ids(&human.children(), identify),
                parents: ids(&human.parents(), identify),
                contact_information,
            });
        }
        if let Some(organization) = entity.downcast_ref::<Organization>() {
            return to_json(&OrganizationPayload {
                name: organization.name(),
            });
        }
        if let Some(department) = entity.downcast_ref::<Department>() {
            return to_json(&DepartmentPayload {
                name: department.name().to_string(),
                teams: ids(&department.teams(), identify),
            });
        }
        if let Some(team) = entity.downcast_ref::<Team>() {
            return to_json(&TeamPayload {
                name: team.name().to_string(),
                department: team.department().and_then(|d| identify(&d)),
            });
        }
        Err(CoreError::codec(format!(
            "no payload shape for {}",
            entity.type_name()
        )))
    }

    fn decode(&self, type_name: &str, payload: &[u8]) -> CoreResult<ObjectRef> {
        match type_name {
            "Human" => {
                let p: HumanPayload = from_json(payload)?;
                let human = Human::create(&p.name, &p.first_name, &p.nick_name, &p.last_name);
                if let Some(contact) = p.contact_information {
                    ContactInformation::attach(&human, &contact.email, &contact.phone);
                }
                Ok(human)
            }
            "Organization" => {
                let p: OrganizationPayload = from_json(payload)?;
                Ok(Organization::create(&p.name))
            }
            "Department" => {
                let p: DepartmentPayload = from_json(payload)?;
                Ok(Department::create(&p.name))
            }
            "Team" => {
                let p: TeamPayload = from_json(payload)?;
                Ok(Team::detached(&p.name))
            }
            other => Err(CoreError::codec(format!("unknown entity type {other}"))),
        }
    }

    fn relink(&self, entity: &ObjectRef, payload: &[u8], resolver: Resolver<'_, Id>) -> CoreResult<()> {
        match entity.type_name() {
            "Human" => {
                let p: HumanPayload = from_json(payload)?;
                let human = Human::of(entity);
                for employment in p.employments {
                    let employer = resolve(resolver, "Organization", employment.employer)?;
                    Employment::link(&employment.title, entity, &employer);
                }
                for id in p.children {
                    human.push_child(resolve(resolver, "Human", id)?);
                }
                for id in p.parents {
                    human.push_parent(resolve(resolver, "Human", id)?);
                }
                Ok(())
            }
            "Department" => {
                let p: DepartmentPayload = from_json(payload)?;
                let department = Department::of(entity);
                for id in p.teams {
                    department.push_team(resolve(resolver, "Team", id)?);
                }
                Ok(())
            }
            "Team" => {
                let p: TeamPayload = from_json(payload)?;
                let department = p
                    .department
                    .map(|id| resolve(resolver, "Department", id))
                    .transpose()?;
                Team::of(entity).set_department(department);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
