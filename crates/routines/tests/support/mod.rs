//! In-memory hosting platform for routine tests.
//!
//! Models a fork network: one commit graph shared by every repository, branch
//! and tag refs per repository, issues and pull requests sharing a number
//! space, and comments. Every mutating call is appended to `writes` so tests
//! can assert that a run had no side effects.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use model::{
    AccountKind, Actor, AncestryRelation, BaselineStore, BranchName, CodeRepository, CommentId,
    CommentRecord, CommitSha, Comparison, DiffStats, Finding, ForkGuardError, HostError,
    IssueNumber, IssueRecord, IssueTracker, Label, Login, NewPullRequest, PullRequestManager,
    PullRequestNumber, PullRequestRecord, RawTag, RepositoryRef, Revision, SecurityFindings,
    TagSnapshot, TagTarget, WorkflowDispatcher,
};

pub fn sha(s: &str) -> CommitSha {
    CommitSha::new(s).unwrap()
}

pub fn repo(s: &str) -> RepositoryRef {
    RepositoryRef::parse(s).unwrap()
}

pub fn branch(s: &str) -> BranchName {
    BranchName::new(s).unwrap()
}

pub fn bot(login: &str) -> Actor {
    Actor {
        login: Login::new(login).unwrap(),
        kind: AccountKind::Bot,
    }
}

pub fn user(login: &str) -> Actor {
    Actor {
        login: Login::new(login).unwrap(),
        kind: AccountKind::User,
    }
}

#[derive(Debug, Clone)]
pub struct FakeIssue {
    pub number: u64,
    pub repo: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub open: bool,
}

#[derive(Debug, Clone)]
pub struct FakeComment {
    pub id: u64,
    pub repo: String,
    pub issue: u64,
    pub author: Actor,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct FakePull {
    pub number: u64,
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
    pub author: Actor,
    pub open: bool,
}

#[derive(Debug, Default)]
pub struct State {
    pub parents: HashMap<CommitSha, Vec<CommitSha>>,
    pub branches: HashMap<(String, String), CommitSha>,
    pub tags: HashMap<String, Vec<RawTag>>,
    pub tag_objects: HashMap<CommitSha, TagTarget>,
    pub unreachable: HashSet<String>,
    pub reject_ref_updates: bool,
    pub issues: Vec<FakeIssue>,
    pub comments: Vec<FakeComment>,
    pub pulls: Vec<FakePull>,
    pub dependency_findings: Vec<Finding>,
    pub code_findings: Vec<Finding>,
    pub dispatches: Vec<(String, String, Vec<(String, String)>)>,
    pub writes: Vec<String>,
    pub tag_object_reads: usize,
    next_number: u64,
    next_comment: u64,
}

/// Fake platform. `actor` is the identity every write is attributed to.
pub struct FakeHost {
    state: Mutex<State>,
    actor: Actor,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Self::acting_as(bot(model::AMBIENT_TOKEN_LOGIN))
    }

    pub fn acting_as(actor: Actor) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            actor,
        })
    }

    pub fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Adds a commit with the given parents to the shared graph.
    pub fn commit(&self, id: &str, parents: &[&str]) {
        self.state()
            .parents
            .insert(sha(id), parents.iter().map(|p| sha(p)).collect());
    }

    pub fn set_branch(&self, repository: &str, name: &str, id: &str) {
        self.state()
            .branches
            .insert((repository.to_string(), name.to_string()), sha(id));
    }

    pub fn branch_at(&self, repository: &str, name: &str) -> Option<CommitSha> {
        self.state()
            .branches
            .get(&(repository.to_string(), name.to_string()))
            .cloned()
    }

    pub fn add_tag(&self, repository: &str, name: &str, target: TagTarget) {
        self.state()
            .tags
            .entry(repository.to_string())
            .or_default()
            .push(RawTag {
                name: name.to_string(),
                target,
            });
    }

    pub fn add_tag_object(&self, object: &str, target: TagTarget) {
        self.state().tag_objects.insert(sha(object), target);
    }

    pub fn add_comment(&self, repository: &str, issue: u64, author: Actor, body: &str) -> u64 {
        let mut state = self.state();
        state.next_comment += 1;
        let id = state.next_comment;
        state.comments.push(FakeComment {
            id,
            repo: repository.to_string(),
            issue,
            author,
            body: body.to_string(),
        });
        id
    }

    pub fn add_pull(&self, repository: &str, head: &str, base: &str, author: Actor) -> u64 {
        let mut state = self.state();
        state.next_number += 1;
        let number = state.next_number;
        state.pulls.push(FakePull {
            number,
            repo: repository.to_string(),
            head: head.to_string(),
            base: base.to_string(),
            title: "existing".into(),
            body: String::new(),
            labels: vec![],
            author,
            open: true,
        });
        number
    }

    pub fn writes(&self) -> Vec<String> {
        self.state().writes.clone()
    }

    pub fn open_issues(&self) -> Vec<FakeIssue> {
        self.state().issues.iter().filter(|i| i.open).cloned().collect()
    }

    pub fn comments_on(&self, issue: u64) -> Vec<FakeComment> {
        self.state()
            .comments
            .iter()
            .filter(|c| c.issue == issue)
            .cloned()
            .collect()
    }

    fn reachable(&self, repository: &RepositoryRef) -> Result<(), HostError> {
        if self.state().unreachable.contains(&repository.to_string()) {
            return Err(HostError::Transport {
                message: format!("connection to {repository} timed out"),
            });
        }
        Ok(())
    }

    fn ancestors(state: &State, tip: &CommitSha) -> HashSet<CommitSha> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([tip.clone()]);
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                if let Some(parents) = state.parents.get(&next) {
                    queue.extend(parents.iter().cloned());
                }
            }
        }
        seen
    }

    fn resolve(state: &State, repository: &RepositoryRef, rev: &Revision) -> Result<CommitSha, HostError> {
        match rev {
            Revision::Commit(sha) => Ok(sha.clone()),
            Revision::Branch(name) => state
                .branches
                .get(&(repository.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| HostError::NotFound {
                    resource: format!("{repository}@{name}"),
                }),
        }
    }
}

#[async_trait]
impl CodeRepository for FakeHost {
    async fn branch_head(
        &self,
        repository: &RepositoryRef,
        name: &BranchName,
    ) -> Result<Option<CommitSha>, HostError> {
        self.reachable(repository)?;
        Ok(self.branch_at(&repository.to_string(), name.as_str()))
    }

    async fn compare(
        &self,
        repository: &RepositoryRef,
        base: &Revision,
        head: &Revision,
    ) -> Result<Comparison, HostError> {
        self.reachable(repository)?;
        let state = self.state();
        let base = Self::resolve(&state, repository, base)?;
        let head = Self::resolve(&state, repository, head)?;
        let base_anc = Self::ancestors(&state, &base);
        let head_anc = Self::ancestors(&state, &head);
        let relation = if base == head {
            AncestryRelation::Identical
        } else if head_anc.contains(&base) {
            AncestryRelation::Ahead
        } else if base_anc.contains(&head) {
            AncestryRelation::Behind
        } else {
            AncestryRelation::Diverged
        };
        let ahead_by = head_anc.difference(&base_anc).count() as u64;
        let behind_by = base_anc.difference(&head_anc).count() as u64;
        Ok(Comparison {
            relation,
            ahead_by,
            behind_by,
            stats: DiffStats {
                commits: ahead_by,
                files_changed: ahead_by,
                additions: ahead_by * 10,
                deletions: ahead_by,
                files_truncated: false,
            },
        })
    }

    async fn create_branch(
        &self,
        repository: &RepositoryRef,
        name: &BranchName,
        sha: &CommitSha,
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        let key = (repository.to_string(), name.to_string());
        if state.branches.contains_key(&key) {
            return Err(HostError::Conflict {
                message: "Reference already exists".into(),
            });
        }
        state.branches.insert(key, sha.clone());
        state.writes.push(format!("create_branch {repository}@{name} {sha}"));
        Ok(())
    }

    async fn update_branch(
        &self,
        repository: &RepositoryRef,
        name: &BranchName,
        sha: &CommitSha,
        force: bool,
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        if state.reject_ref_updates {
            return Err(HostError::Conflict {
                message: "Update is not a fast forward".into(),
            });
        }
        let key = (repository.to_string(), name.to_string());
        let current = state.branches.get(&key).cloned().ok_or_else(|| HostError::NotFound {
            resource: format!("{repository}@{name}"),
        })?;
        if !force && !Self::ancestors(&state, sha).contains(&current) {
            return Err(HostError::Conflict {
                message: "Update is not a fast forward".into(),
            });
        }
        state.branches.insert(key, sha.clone());
        state
            .writes
            .push(format!("update_branch {repository}@{name} {sha} force={force}"));
        Ok(())
    }

    async fn list_tags(&self, repository: &RepositoryRef) -> Result<Vec<RawTag>, HostError> {
        self.reachable(repository)?;
        Ok(self
            .state()
            .tags
            .get(&repository.to_string())
            .cloned()
            .unwrap_or_default())
    }

    async fn read_tag_object(
        &self,
        repository: &RepositoryRef,
        object: &CommitSha,
    ) -> Result<TagTarget, HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        state.tag_object_reads += 1;
        state
            .tag_objects
            .get(object)
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                resource: format!("tag object {object}"),
            })
    }
}

#[async_trait]
impl IssueTracker for FakeHost {
    async fn find_open_issue(
        &self,
        repository: &RepositoryRef,
        label: &Label,
        title: &str,
    ) -> Result<Option<IssueRecord>, HostError> {
        self.reachable(repository)?;
        Ok(self
            .state()
            .issues
            .iter()
            .find(|i| {
                i.open
                    && i.repo == repository.to_string()
                    && i.title == title
                    && i.labels.iter().any(|l| l == label.as_str())
            })
            .map(|i| IssueRecord {
                number: IssueNumber::new(i.number),
                title: i.title.clone(),
            }))
    }

    async fn create_issue(
        &self,
        repository: &RepositoryRef,
        title: &str,
        body: &str,
        labels: &[Label],
    ) -> Result<IssueNumber, HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        state.next_number += 1;
        let number = state.next_number;
        state.issues.push(FakeIssue {
            number,
            repo: repository.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            open: true,
        });
        state.writes.push(format!("create_issue #{number} {title}"));
        Ok(IssueNumber::new(number))
    }

    async fn create_comment(
        &self,
        repository: &RepositoryRef,
        number: IssueNumber,
        body: &str,
    ) -> Result<CommentId, HostError> {
        self.reachable(repository)?;
        let id = self.add_comment(&repository.to_string(), number.as_u64(), self.actor.clone(), body);
        self.state().writes.push(format!("create_comment #{number} {id}"));
        Ok(CommentId::new(id))
    }

    async fn list_comments(
        &self,
        repository: &RepositoryRef,
        number: IssueNumber,
    ) -> Result<Vec<CommentRecord>, HostError> {
        self.reachable(repository)?;
        Ok(self
            .comments_on(number.as_u64())
            .into_iter()
            .map(|c| CommentRecord {
                id: CommentId::new(c.id),
                author: c.author,
                body: c.body,
            })
            .collect())
    }

    async fn update_comment(
        &self,
        repository: &RepositoryRef,
        id: CommentId,
        body: &str,
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == id.as_u64())
            .ok_or_else(|| HostError::NotFound {
                resource: format!("comment {id}"),
            })?;
        comment.body = body.to_string();
        state.writes.push(format!("update_comment {id}"));
        Ok(())
    }

    async fn delete_comment(&self, repository: &RepositoryRef, id: CommentId) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        state.comments.retain(|c| c.id != id.as_u64());
        state.writes.push(format!("delete_comment {id}"));
        Ok(())
    }
}

#[async_trait]
impl PullRequestManager for FakeHost {
    async fn find_open_pull_request(
        &self,
        repository: &RepositoryRef,
        head: &BranchName,
        base: &BranchName,
    ) -> Result<Option<PullRequestNumber>, HostError> {
        self.reachable(repository)?;
        Ok(self
            .state()
            .pulls
            .iter()
            .find(|p| {
                p.open
                    && p.repo == repository.to_string()
                    && p.head == head.as_str()
                    && p.base == base.as_str()
            })
            .map(|p| PullRequestNumber::new(p.number)))
    }

    async fn create_pull_request(
        &self,
        repository: &RepositoryRef,
        request: &NewPullRequest,
    ) -> Result<PullRequestNumber, HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        state.next_number += 1;
        let number = state.next_number;
        state.pulls.push(FakePull {
            number,
            repo: repository.to_string(),
            head: request.head.to_string(),
            base: request.base.to_string(),
            title: request.title.clone(),
            body: request.body.clone(),
            labels: vec![],
            author: self.actor.clone(),
            open: true,
        });
        state.writes.push(format!("create_pull_request #{number}"));
        Ok(PullRequestNumber::new(number))
    }

    async fn update_pull_request_body(
        &self,
        repository: &RepositoryRef,
        number: PullRequestNumber,
        body: &str,
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        if let Some(pr) = state.pulls.iter_mut().find(|p| p.number == number.as_u64()) {
            pr.body = body.to_string();
        }
        state.writes.push(format!("update_pull_request_body #{number}"));
        Ok(())
    }

    async fn add_labels(
        &self,
        repository: &RepositoryRef,
        number: PullRequestNumber,
        labels: &[Label],
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        if let Some(pr) = state.pulls.iter_mut().find(|p| p.number == number.as_u64()) {
            pr.labels.extend(labels.iter().map(|l| l.to_string()));
        }
        state.writes.push(format!("add_labels #{number}"));
        Ok(())
    }

    async fn pull_request(
        &self,
        repository: &RepositoryRef,
        number: PullRequestNumber,
    ) -> Result<PullRequestRecord, HostError> {
        self.reachable(repository)?;
        let pr = self
            .state()
            .pulls
            .iter()
            .find(|p| p.number == number.as_u64())
            .cloned()
            .ok_or_else(|| HostError::NotFound {
                resource: format!("pull request #{number}"),
            })?;
        let head_sha = self
            .branch_at(&pr.repo, &pr.head)
            .unwrap_or_else(|| sha("ffff"));
        let base_sha = self
            .branch_at(&pr.repo, &pr.base)
            .unwrap_or_else(|| sha("eeee"));
        Ok(PullRequestRecord {
            number,
            author: pr.author,
            head_branch: branch(&pr.head),
            head_sha,
            base_branch: branch(&pr.base),
            base_sha,
            labels: pr.labels.iter().filter_map(|l| Label::new(l.as_str())).collect(),
        })
    }
}

#[async_trait]
impl SecurityFindings for FakeHost {
    async fn dependency_findings(
        &self,
        repository: &RepositoryRef,
        _base: &CommitSha,
        _head: &CommitSha,
    ) -> Result<Vec<Finding>, HostError> {
        self.reachable(repository)?;
        Ok(self.state().dependency_findings.clone())
    }

    async fn code_scanning_findings(
        &self,
        repository: &RepositoryRef,
        _number: PullRequestNumber,
    ) -> Result<Vec<Finding>, HostError> {
        self.reachable(repository)?;
        Ok(self.state().code_findings.clone())
    }
}

#[async_trait]
impl WorkflowDispatcher for FakeHost {
    async fn dispatch_workflow(
        &self,
        repository: &RepositoryRef,
        workflow: &str,
        git_ref: &BranchName,
        inputs: &[(String, String)],
    ) -> Result<(), HostError> {
        self.reachable(repository)?;
        let mut state = self.state();
        state
            .dispatches
            .push((workflow.to_string(), git_ref.to_string(), inputs.to_vec()));
        state.writes.push(format!("dispatch {workflow} on {git_ref}"));
        Ok(())
    }
}

/// Baseline store held in memory.
#[derive(Default)]
pub struct MemoryBaseline {
    pub snapshot: Mutex<Option<TagSnapshot>>,
    pub saves: Mutex<usize>,
}

#[async_trait]
impl BaselineStore for MemoryBaseline {
    async fn load(&self) -> Result<Option<TagSnapshot>, ForkGuardError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn save(&self, snapshot: &TagSnapshot) -> Result<(), ForkGuardError> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
